//! HTTP and WebSocket request handlers
//!
//! This module organizes all handlers into logical groups:
//! - `api` - Health check endpoint
//! - `twiml` - TwiML connection descriptor for incoming calls
//! - `relay` - ConversationRelay WebSocket (one socket per call)
//! - `compliance` - Transcription webhook and compliance listener feed

pub mod api;
pub mod compliance;
pub mod relay;
pub mod twiml;

// Re-export commonly used handlers for convenient access
pub use compliance::{compliance_handler, transcription_webhook};
pub use relay::relay_handler;
pub use twiml::twiml_handler;
