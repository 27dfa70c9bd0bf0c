//! Streaming language-model completion providers.
//!
//! The relay only depends on [`CompletionProvider`]: given a transcript it gets
//! back a lazy stream of text deltas. The concrete backend is an
//! OpenAI-compatible chat-completions client.
//!
//! # Example
//!
//! ```rust,ignore
//! use futures::StreamExt;
//! use voice_relay_gateway::core::llm::{CompletionProvider, OpenAICompletion, OpenAICompletionConfig};
//! use voice_relay_gateway::core::session::Turn;
//!
//! #[tokio::main]
//! async fn main() {
//!     let provider = OpenAICompletion::new(OpenAICompletionConfig::new("sk-...")).unwrap();
//!     let mut stream = provider.open(vec![Turn::user("Tell me a joke")]);
//!     while let Some(delta) = stream.next().await {
//!         print!("{}", delta.unwrap());
//!     }
//! }
//! ```

mod base;
pub mod openai;

use std::sync::Arc;

pub use base::{
    BoxedCompletion, CompletionError, CompletionProvider, CompletionResult, CompletionStream,
    TextDelta,
};
pub use openai::{OpenAICompletion, OpenAICompletionConfig};

use crate::config::ServerConfig;

/// Build the completion provider described by the server configuration.
pub fn create_completion_provider(config: &ServerConfig) -> CompletionResult<BoxedCompletion> {
    let openai = OpenAICompletionConfig::new(config.openai_api_key.clone())
        .with_model(config.openai_model.clone())
        .with_base_url(config.openai_base_url.clone());

    Ok(Arc::new(OpenAICompletion::new(openai)?))
}
