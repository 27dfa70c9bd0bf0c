//! OpenAI streaming chat-completions client.
//!
//! # API Reference
//!
//! - Endpoint: `POST {base_url}/chat/completions` with `"stream": true`
//! - Response: `text/event-stream`, one chunk JSON object per event,
//!   terminated by `data: [DONE]`
//! - Delta text lives at `choices[0].delta.content`

use std::sync::Arc;
use std::time::Duration;

use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, trace};

use super::config::{OpenAICompletionConfig, STREAM_DONE_MARKER};
use crate::core::llm::base::{
    CompletionError, CompletionProvider, CompletionResult, CompletionStream,
};
use crate::core::session::Turn;

/// Timeout for establishing the TCP/TLS connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum silence between two stream events before giving up
const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Turn],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// What a single SSE data line means for the delta stream.
#[derive(Debug, PartialEq, Eq)]
enum ChunkOutcome {
    Delta(String),
    Skip,
    Done,
}

fn extract_api_error_message(event_json: &Value) -> Option<String> {
    let error = event_json.get("error")?;
    if let Some(message) = error.get("message").and_then(|value| value.as_str()) {
        return Some(message.to_string());
    }
    if let Some(message) = error.as_str() {
        return Some(message.to_string());
    }
    Some("An error occurred during streaming".to_string())
}

fn parse_chunk(data: &str) -> CompletionResult<ChunkOutcome> {
    let data = data.trim();
    if data == STREAM_DONE_MARKER {
        return Ok(ChunkOutcome::Done);
    }

    let event_json: Value = serde_json::from_str(data)
        .map_err(|e| CompletionError::Decode(format!("{e}, data: {data}")))?;

    if let Some(message) = extract_api_error_message(&event_json) {
        return Err(CompletionError::Api(message));
    }

    // Compatible backends do not all tag chunks with `object`; only the
    // presence of `choices` matters.
    if event_json.get("choices").is_none() {
        debug!(
            object = event_json.get("object").and_then(serde_json::Value::as_str).unwrap_or("<missing>"),
            "Skipping completion event without choices"
        );
        return Ok(ChunkOutcome::Skip);
    }

    let chunk: ChatCompletionChunk = serde_json::from_value(event_json)
        .map_err(|e| CompletionError::Decode(format!("{e}, data: {data}")))?;

    let content = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .unwrap_or_default();

    if content.is_empty() {
        Ok(ChunkOutcome::Skip)
    } else {
        Ok(ChunkOutcome::Delta(content))
    }
}

/// Streaming completion provider backed by an OpenAI-compatible API.
#[derive(Clone)]
pub struct OpenAICompletion {
    client: reqwest::Client,
    config: Arc<OpenAICompletionConfig>,
}

impl OpenAICompletion {
    pub fn new(config: OpenAICompletionConfig) -> CompletionResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &OpenAICompletionConfig {
        &self.config
    }
}

impl CompletionProvider for OpenAICompletion {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn open(&self, transcript: Vec<Turn>) -> CompletionStream {
        let client = self.client.clone();
        let config = Arc::clone(&self.config);

        Box::pin(async_stream::stream! {
            let request = ChatCompletionRequest {
                model: &config.model,
                messages: &transcript,
                stream: true,
            };

            debug!(model = %config.model, turns = transcript.len(), "Opening completion stream");

            let response = match client
                .post(config.completions_url())
                .bearer_auth(&config.api_key)
                .json(&request)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    yield Err(CompletionError::from(e));
                    return;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                yield Err(CompletionError::Status {
                    status: status.as_u16(),
                    body,
                });
                return;
            }

            let mut events = response.bytes_stream().eventsource();
            loop {
                let event = match timeout(STREAM_IDLE_TIMEOUT, events.next()).await {
                    Ok(Some(Ok(event))) => event,
                    Ok(Some(Err(e))) => {
                        yield Err(CompletionError::Stream(e.to_string()));
                        return;
                    }
                    // Body ended without [DONE]; treat what we have as complete
                    Ok(None) => return,
                    Err(_) => {
                        yield Err(CompletionError::Stream(format!(
                            "no event for {}s",
                            STREAM_IDLE_TIMEOUT.as_secs()
                        )));
                        return;
                    }
                };

                trace!(data = %event.data, "Completion SSE event");

                match parse_chunk(&event.data) {
                    Ok(ChunkOutcome::Delta(text)) => yield Ok(text),
                    Ok(ChunkOutcome::Skip) => {}
                    Ok(ChunkOutcome::Done) => return,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        })
    }
}
