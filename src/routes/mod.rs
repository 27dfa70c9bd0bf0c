pub mod compliance;
pub mod relay;

use axum::{Router, routing::get};
use std::sync::Arc;

use crate::handlers::api::health_check;
use crate::state::AppState;

/// Full application router with state attached.
pub fn create_router(state: Arc<AppState>) -> Router {
    let public_routes = Router::new().route("/", get(health_check));

    public_routes
        .merge(relay::create_relay_router())
        .merge(compliance::create_compliance_router())
        .with_state(state)
}
