pub mod compliance;
pub mod llm;
pub mod session;

// Re-export commonly used types for convenience
pub use compliance::{ComplianceHub, TranscriptDeduper, TranscriptionPayload};

pub use llm::{
    BoxedCompletion, CompletionError, CompletionProvider, CompletionResult, CompletionStream,
    OpenAICompletion, OpenAICompletionConfig, TextDelta, create_completion_provider,
};

pub use session::{Role, SessionError, SessionResult, SessionStore, Turn};
