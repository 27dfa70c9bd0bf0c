//! Base traits and types for streaming completion providers.
//!
//! A provider turns a transcript into a lazy [`CompletionStream`] of text
//! deltas. The stream is finite and not restartable: it ends with `None` on a
//! natural finish, or yields a single `Err` that is always the last item.
//! Dropping the stream cancels any outstanding network work.

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use thiserror::Error;

use crate::core::session::Turn;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can terminate a completion stream.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// The HTTP request could not be sent or the connection dropped
    #[error("Request failed: {0}")]
    Request(String),

    /// The provider answered with a non-success status
    #[error("Provider returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The server-sent event stream broke mid-response
    #[error("Stream error: {0}")]
    Stream(String),

    /// A chunk could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// The provider reported an error inside the stream
    #[error("Provider error: {0}")]
    Api(String),
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        Self::Request(err.to_string())
    }
}

/// Result type for completion operations.
pub type CompletionResult<T> = Result<T, CompletionError>;

/// One incremental piece of generated text.
pub type TextDelta = String;

/// Lazy, cancellable sequence of text deltas.
pub type CompletionStream = Pin<Box<dyn Stream<Item = CompletionResult<TextDelta>> + Send>>;

// =============================================================================
// Provider Trait
// =============================================================================

/// A language-model backend that streams completions for a transcript.
///
/// `open` must not block or perform I/O itself; all work happens when the
/// returned stream is polled.
pub trait CompletionProvider: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &'static str;

    /// Begin a completion for `transcript`.
    fn open(&self, transcript: Vec<Turn>) -> CompletionStream;
}

/// Shared provider handle as stored in application state.
pub type BoxedCompletion = Arc<dyn CompletionProvider>;
