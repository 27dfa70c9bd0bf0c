//! Test Fixtures Module
//!
//! Shared helpers for the relay integration tests:
//! - Completion provider doubles (scripted, echo, gated)
//! - Configuration fixtures
//! - ConversationRelay message builders

// Each test binary uses a different subset of these helpers
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use futures::channel::mpsc;
use parking_lot::Mutex;
use serde_json::json;

use voice_relay_gateway::{
    CompletionError, CompletionProvider, CompletionResult, CompletionStream, ServerConfig, Turn,
};

pub const TEST_SYSTEM_PROMPT: &str = "You are a test assistant.";

/// Minimal configuration pointing the completion client at `base_url`.
pub fn test_config(base_url: &str) -> ServerConfig {
    let mut config = ServerConfig::new("relay.test", "sk-test");
    config.host = "127.0.0.1".to_string();
    config.port = 0;
    config.openai_base_url = base_url.to_string();
    config.system_prompt = TEST_SYSTEM_PROMPT.to_string();
    config
}

pub fn setup_json(call_sid: &str) -> String {
    json!({
        "type": "setup",
        "sessionId": "VX0000",
        "callSid": call_sid,
        "from": "+15550001111",
        "to": "+15550002222",
    })
    .to_string()
}

pub fn prompt_json(text: &str) -> String {
    json!({"type": "prompt", "voicePrompt": text, "lang": "en-US", "last": true}).to_string()
}

pub fn interrupt_json(heard: &str) -> String {
    json!({"type": "interrupt", "utteranceUntilInterrupt": heard, "durationUntilInterruptMs": 500})
        .to_string()
}

/// One step of a scripted completion.
#[derive(Debug, Clone)]
pub enum Step {
    Delta(&'static str),
    Fail(&'static str),
}

/// Replays one script per `open` call, in order.
#[derive(Default)]
pub struct ScriptedCompletion {
    scripts: Mutex<VecDeque<Vec<Step>>>,
    transcripts: Mutex<Vec<Vec<Turn>>>,
}

impl ScriptedCompletion {
    pub fn new(scripts: Vec<Vec<Step>>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            transcripts: Mutex::new(Vec::new()),
        })
    }

    /// Transcripts passed to `open`, in call order.
    pub fn transcripts(&self) -> Vec<Vec<Turn>> {
        self.transcripts.lock().clone()
    }
}

impl CompletionProvider for ScriptedCompletion {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn open(&self, transcript: Vec<Turn>) -> CompletionStream {
        self.transcripts.lock().push(transcript);
        let items: Vec<CompletionResult<String>> = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_default()
            .into_iter()
            .map(|step| match step {
                Step::Delta(text) => Ok(text.to_string()),
                Step::Fail(reason) => Err(CompletionError::Stream(reason.to_string())),
            })
            .collect();
        Box::pin(futures::stream::iter(items))
    }
}

/// Replies `echo: <last user turn>` in two deltas.
pub struct EchoCompletion;

impl CompletionProvider for EchoCompletion {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn open(&self, transcript: Vec<Turn>) -> CompletionStream {
        let last = transcript
            .last()
            .map(|turn| turn.content.clone())
            .unwrap_or_default();
        let items: Vec<CompletionResult<String>> = vec![Ok("echo: ".to_string()), Ok(last)];
        Box::pin(futures::stream::iter(items))
    }
}

/// Streams whatever the test pushes through a gate. Dropping the gate ends
/// the stream.
#[derive(Default)]
pub struct GatedCompletion {
    gates: Mutex<VecDeque<mpsc::UnboundedReceiver<CompletionResult<String>>>>,
}

impl GatedCompletion {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Gate for the next stream this provider opens.
    pub fn gate(&self) -> mpsc::UnboundedSender<CompletionResult<String>> {
        let (tx, rx) = mpsc::unbounded();
        self.gates.lock().push_back(rx);
        tx
    }
}

impl CompletionProvider for GatedCompletion {
    fn name(&self) -> &'static str {
        "gated"
    }

    fn open(&self, _transcript: Vec<Turn>) -> CompletionStream {
        match self.gates.lock().pop_front() {
            Some(rx) => Box::pin(rx),
            None => Box::pin(futures::stream::empty()),
        }
    }
}
