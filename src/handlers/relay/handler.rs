//! ConversationRelay WebSocket handler
//!
//! Twilio opens one socket per call at `/ws`. The handler wires the socket to a
//! [`CallRelay`]: inbound text frames feed the relay, and a writer task drains
//! the relay's outbound channel back onto the socket.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{
    SinkExt, Stream, StreamExt, future,
    stream::SplitStream,
};
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};
use tracing::{debug, error, info, warn};

use crate::state::AppState;

use super::messages::MessageRoute;
use super::processor::CallRelay;

/// Outbound token buffer per connection
const CHANNEL_BUFFER_SIZE: usize = 256;

/// Maximum WebSocket frame size (1 MB)
const MAX_WS_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum WebSocket message size (1 MB)
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

/// How long the writer may keep flushing after the relay stops
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// ConversationRelay WebSocket handler
///
/// Upgrades the HTTP connection and hands the socket to a fresh [`CallRelay`].
pub async fn relay_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    info!("ConversationRelay WebSocket connection upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_relay_socket(socket, state))
}

/// Handle the ConversationRelay WebSocket connection
async fn handle_relay_socket(socket: WebSocket, app_state: Arc<AppState>) {
    info!("ConversationRelay WebSocket connection established");

    let (mut sender, receiver) = socket.split();
    let (message_tx, mut message_rx) = mpsc::channel::<MessageRoute>(CHANNEL_BUFFER_SIZE);

    // Sender task for outgoing messages
    let mut sender_task = tokio::spawn(async move {
        while let Some(route) = message_rx.recv().await {
            let result = match route {
                MessageRoute::Outgoing(message) => match serde_json::to_string(&message) {
                    Ok(json_str) => sender.send(Message::Text(json_str.into())).await,
                    Err(e) => {
                        error!("Failed to serialize outgoing message: {}", e);
                        continue;
                    }
                },
                MessageRoute::Close => {
                    info!("Closing ConversationRelay WebSocket connection");
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            };

            if let Err(e) = result {
                error!("Failed to send WebSocket message: {}", e);
                break;
            }
        }
    });

    let relay = CallRelay::new(
        app_state.sessions.clone(),
        app_state.completion.clone(),
        app_state.config.system_prompt.as_str(),
        message_tx,
    );

    relay
        .run(Box::pin(text_frames(receiver)), app_state.shutdown.child_token())
        .await;

    // The relay owned the only sender, so the writer ends once the queue drains
    if timeout(WRITER_DRAIN_TIMEOUT, &mut sender_task).await.is_err() {
        sender_task.abort();
    }

    info!(
        active_calls = app_state.sessions.len(),
        "ConversationRelay WebSocket connection terminated"
    );
}

/// Text payloads from the socket, ending at the first close frame or error.
fn text_frames(receiver: SplitStream<WebSocket>) -> impl Stream<Item = String> {
    receiver
        .take_while(|frame| {
            let open = match frame {
                Ok(Message::Close(_)) => {
                    debug!("Received close frame");
                    false
                }
                Ok(_) => true,
                Err(e) => {
                    warn!("ConversationRelay WebSocket error: {}", e);
                    false
                }
            };
            future::ready(open)
        })
        .filter_map(|frame| {
            future::ready(match frame {
                Ok(Message::Text(text)) => Some(text.to_string()),
                Ok(Message::Binary(data)) => {
                    debug!("Ignoring binary frame: {} bytes", data.len());
                    None
                }
                _ => None,
            })
        })
}
