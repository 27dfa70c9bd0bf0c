//! Connection descriptor served to Twilio when a call arrives.

use axum::{
    extract::State,
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
};
use quick_xml::escape::escape;
use std::sync::Arc;
use tracing::debug;

use crate::config::ServerConfig;
use crate::state::AppState;

/// Render the TwiML document that points Twilio at the relay socket.
pub fn render_twiml(config: &ServerConfig) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            "<Response>",
            "<Connect>",
            r#"<ConversationRelay url="{url}" welcomeGreeting="{greeting}" interruptSensitivity="{sensitivity}" />"#,
            "</Connect>",
            "</Response>"
        ),
        url = escape(config.ws_url().as_str()),
        greeting = escape(config.welcome_greeting.as_str()),
        sensitivity = config.interrupt_sensitivity.as_str(),
    )
}

pub async fn twiml_handler(State(state): State<Arc<AppState>>) -> Response {
    debug!(ws_url = %state.config.ws_url(), "Serving TwiML");
    ([(CONTENT_TYPE, "text/xml")], render_twiml(&state.config)).into_response()
}
