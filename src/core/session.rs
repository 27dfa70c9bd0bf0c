//! Per-call conversation transcripts.
//!
//! [`SessionStore`] maps a Twilio call SID to the ordered list of [`Turn`]s for
//! that call. The map is sharded (`DashMap`), so connections serving different
//! calls never contend on a single lock. Every operation completes
//! synchronously; callers never hold an entry guard across an `.await`.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One role-tagged message in a transcript.
///
/// Serializes to the `{"role": ..., "content": ...}` shape chat-completion
/// APIs expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Errors returned by session store mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("No session for call {call_sid}")]
    NotFound { call_sid: String },
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Concurrent store of call transcripts keyed by call SID.
///
/// Cloning is cheap and every clone shares the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, Vec<Turn>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh transcript holding only the system prompt.
    ///
    /// An existing entry for `call_sid` is replaced, not merged. This is what a
    /// reused call SID needs after an unclean teardown of its previous socket.
    pub fn create(&self, call_sid: &str, system_prompt: &str) {
        self.sessions
            .insert(call_sid.to_string(), vec![Turn::system(system_prompt)]);
    }

    /// Append a turn to an existing transcript.
    ///
    /// Never creates an entry: a commit that lands after the session was
    /// removed fails with [`SessionError::NotFound`].
    pub fn append_turn(&self, call_sid: &str, turn: Turn) -> SessionResult<()> {
        match self.sessions.get_mut(call_sid) {
            Some(mut turns) => {
                turns.push(turn);
                Ok(())
            }
            None => Err(not_found(call_sid)),
        }
    }

    /// Replace the content of the trailing assistant turn with what the caller
    /// actually heard.
    ///
    /// Returns `Ok(false)` when the last turn is not an assistant turn; the
    /// system turn is never touched.
    pub fn truncate_assistant(&self, call_sid: &str, retained_prefix: &str) -> SessionResult<bool> {
        let mut turns = self
            .sessions
            .get_mut(call_sid)
            .ok_or_else(|| not_found(call_sid))?;

        match turns.last_mut() {
            Some(last) if last.role == Role::Assistant => {
                last.content.clear();
                last.content.push_str(retained_prefix);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Drop the transcript for a call. Returns whether an entry existed.
    pub fn remove(&self, call_sid: &str) -> bool {
        self.sessions.remove(call_sid).is_some()
    }

    /// Owned copy of the transcript, safe to hand to a completion stream while
    /// the store keeps changing.
    pub fn snapshot(&self, call_sid: &str) -> SessionResult<Vec<Turn>> {
        self.sessions
            .get(call_sid)
            .map(|turns| turns.clone())
            .ok_or_else(|| not_found(call_sid))
    }

    pub fn contains(&self, call_sid: &str) -> bool {
        self.sessions.contains_key(call_sid)
    }

    /// Number of active calls.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

fn not_found(call_sid: &str) -> SessionError {
    SessionError::NotFound {
        call_sid: call_sid.to_string(),
    }
}
