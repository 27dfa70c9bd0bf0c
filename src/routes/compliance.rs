use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::{compliance_handler, transcription_webhook};
use crate::state::AppState;
use std::sync::Arc;

/// Create the compliance router: transcription webhook plus listener feed
pub fn create_compliance_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/transcription", post(transcription_webhook))
        .route("/compliance", get(compliance_handler))
        .layer(TraceLayer::new_for_http())
}
