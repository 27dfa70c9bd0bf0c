//! OpenAI chat-completions provider.

mod client;
mod config;

pub use client::OpenAICompletion;
pub use config::{
    OPENAI_DEFAULT_BASE_URL, OPENAI_DEFAULT_MODEL, OpenAICompletionConfig, STREAM_DONE_MARKER,
};
