//! Application state shared by every request handler.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::core::compliance::ComplianceHub;
use crate::core::llm::{BoxedCompletion, CompletionResult, create_completion_provider};
use crate::core::session::SessionStore;

/// Process-wide state handed to axum handlers.
pub struct AppState {
    pub config: ServerConfig,
    /// Per-call transcripts; the only mutable state shared across connections
    pub sessions: SessionStore,
    pub completion: BoxedCompletion,
    pub compliance: ComplianceHub,
    /// Cancelled on server shutdown; every socket task watches a child token
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Build state with the completion provider described by `config`.
    pub fn new(config: ServerConfig) -> CompletionResult<Arc<Self>> {
        let completion = create_completion_provider(&config)?;
        Ok(Self::with_completion(config, completion))
    }

    /// Build state around an existing completion provider.
    pub fn with_completion(config: ServerConfig, completion: BoxedCompletion) -> Arc<Self> {
        let compliance = ComplianceHub::new(config.transcript_dedup_ttl());
        Arc::new(Self {
            config,
            sessions: SessionStore::new(),
            completion,
            compliance,
            shutdown: CancellationToken::new(),
        })
    }
}
