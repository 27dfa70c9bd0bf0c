//! ConversationRelay route configuration
//!
//! `GET /twiml` tells Twilio where the relay socket lives; Twilio then opens
//! `GET /ws` once per call.
//!
//! # Protocol
//!
//! After the WebSocket upgrade Twilio sends:
//! 1. `setup` with the call SID
//! 2. `prompt` for each caller utterance
//! 3. `interrupt` when the caller talks over a reply
//!
//! The server answers each prompt with zero or more
//! `{"type":"text","token":"...","last":false}` messages followed by exactly
//! one `{"type":"text","token":"","last":true}`.

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::config::WS_PATH;
use crate::handlers::{relay_handler, twiml_handler};
use crate::state::AppState;
use std::sync::Arc;

/// Create the ConversationRelay router
pub fn create_relay_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/twiml", get(twiml_handler))
        .route(WS_PATH, get(relay_handler))
        .layer(TraceLayer::new_for_http())
}
