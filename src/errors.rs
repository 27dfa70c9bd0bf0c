//! Error taxonomy for the call relay.
//!
//! Every failure the relay can observe while serving a connection maps onto one
//! of the [`RelayError`] variants. Only [`RelayError::TransportFailure`] ends the
//! connection; everything else is logged and the next inbound message is
//! processed as usual.

use thiserror::Error;

use crate::core::llm::CompletionError;
use crate::core::session::SessionError;

/// Errors raised while processing relay events.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Malformed payload, unknown event type, or an event out of state order
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Mutating event for a call with no session entry
    #[error("Session not found for call {0}")]
    SessionNotFound(String),

    /// Completion stream failed mid-generation
    #[error("Completion stream failed: {0}")]
    AdapterFailure(#[from] CompletionError),

    /// Outbound transport is gone
    #[error("Transport failure: {0}")]
    TransportFailure(String),
}

impl RelayError {
    /// Whether the connection must be torn down after this error.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::TransportFailure(_))
    }
}

impl From<SessionError> for RelayError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound { call_sid } => Self::SessionNotFound(call_sid),
        }
    }
}

/// Result type for relay event processing.
pub type RelayResult<T> = Result<T, RelayError>;
