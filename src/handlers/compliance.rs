//! Compliance transcription feed
//!
//! Twilio posts real-time transcription events to `/transcription`; every
//! accepted payload is fanned out to the WebSocket listeners on `/compliance`.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, header::CONTENT_TYPE},
    response::{Json, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::select;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::core::compliance::TranscriptionPayload;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct TranscriptionAck {
    pub ok: bool,
    /// Listeners the event was queued for (see [`ComplianceHub::publish`])
    ///
    /// [`ComplianceHub::publish`]: crate::core::compliance::ComplianceHub::publish
    pub delivered_clients: usize,
}

fn parse_form(body: &str) -> TranscriptionPayload {
    url::form_urlencoded::parse(body.as_bytes())
        .map(|(key, value)| (key.into_owned(), Value::String(value.into_owned())))
        .collect()
}

fn parse_json(body: &str) -> TranscriptionPayload {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => map,
        Ok(other) => Map::from_iter([("payload".to_string(), other)]),
        Err(_) => Map::from_iter([("raw_body".to_string(), Value::String(body.to_string()))]),
    }
}

/// Decode a webhook body. The content type picks the format; without a known
/// one, form encoding is tried first, then JSON.
pub fn parse_transcription_body(content_type: &str, body: &[u8]) -> TranscriptionPayload {
    let body = String::from_utf8_lossy(body);
    let content_type = content_type.to_ascii_lowercase();

    if content_type.contains("application/x-www-form-urlencoded") {
        return parse_form(&body);
    }
    if content_type.contains("application/json") {
        return parse_json(&body);
    }

    let form = parse_form(&body);
    if !form.is_empty() && !looks_like_json(&body) {
        return form;
    }
    parse_json(&body)
}

// `{"a":1}` also parses as a single form key, so JSON-looking bodies skip the
// form fallback.
fn looks_like_json(body: &str) -> bool {
    matches!(body.trim_start().chars().next(), Some('{' | '[' | '"'))
}

/// Twilio real-time transcription webhook
pub async fn transcription_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<TranscriptionAck> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let payload = parse_transcription_body(content_type, &body);

    let event = payload
        .get("TranscriptionEvent")
        .and_then(Value::as_str)
        .unwrap_or("-")
        .to_string();
    let call_sid = payload
        .get("CallSid")
        .and_then(Value::as_str)
        .unwrap_or("-")
        .to_string();

    if state.compliance.is_duplicate(&payload) {
        info!(call_sid = %call_sid, event = %event, "Duplicate transcription skipped");
        return Json(TranscriptionAck {
            ok: true,
            delivered_clients: 0,
        });
    }

    let delivered_clients = state.compliance.publish(&payload);
    info!(
        call_sid = %call_sid,
        event = %event,
        delivered_clients,
        "Transcription webhook received"
    );

    Json(TranscriptionAck {
        ok: true,
        delivered_clients,
    })
}

/// Compliance listener WebSocket handler
pub async fn compliance_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_compliance_socket(socket, state))
}

async fn handle_compliance_socket(socket: WebSocket, app_state: Arc<AppState>) {
    let mut feed = app_state.compliance.subscribe();
    let shutdown = app_state.shutdown.child_token();
    info!(
        listeners = app_state.compliance.listener_count(),
        "Compliance WebSocket connected"
    );

    let (mut sender, mut receiver) = socket.split();

    loop {
        select! {
            _ = shutdown.cancelled() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Compliance WebSocket error: {}", e);
                    break;
                }
            },
            message = feed.recv() => match message {
                Ok(json) => {
                    if let Err(e) = sender.send(Message::Text(json.to_string().into())).await {
                        debug!("Failed to send compliance event: {}", e);
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Compliance listener lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    drop(feed);
    info!(
        listeners = app_state.compliance.listener_count(),
        "Compliance WebSocket disconnected"
    );
}
