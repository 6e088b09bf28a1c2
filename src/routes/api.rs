use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::{api, session};
use crate::state::AppState;
use std::sync::Arc;

/// Create the API router
///
/// # Endpoints
///
/// - `POST /session` - exchange a session offer (SDP text) for an answer
/// - `GET /health` - liveness check
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/session", post(session::create_session))
        .route("/health", get(api::health_check))
        .layer(TraceLayer::new_for_http())
}
