//! Twilio ConversationRelay endpoint
//!
//! - `messages` - wire codec for inbound events and outbound text tokens
//! - `processor` - per-connection state machine driving completions
//! - `handler` - axum WebSocket upgrade and socket plumbing

pub mod handler;
pub mod messages;
pub mod processor;

pub use handler::relay_handler;
pub use messages::{InboundEvent, MessageRoute, OutgoingMessage, parse_inbound};
pub use processor::{CallRelay, RelayState};
