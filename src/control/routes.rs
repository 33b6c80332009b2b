use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use super::handlers::{copy_handler, health_handler, list_handler, mirror_handler};
use super::ControlState;

pub fn build_router(state: ControlState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/list", post(list_handler))
        .route("/api/v1/copy", post(copy_handler))
        .route("/api/v1/mirror", post(mirror_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
