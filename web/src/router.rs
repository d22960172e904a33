//! Route table for the gateway.

use crate::handlers;
use crate::middleware::request_id_layer;
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// Build the gateway router.
///
/// | Method | Path              | Handler |
/// |--------|-------------------|---------|
/// | GET    | `/`               | welcome |
/// | GET    | `/health`         | liveness |
/// | GET    | `/health/ready`   | readiness |
/// | GET    | `/metrics`        | Prometheus scrape |
/// | POST   | `/api/v1/prompt`  | prompt submission |
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::welcome))
        .route("/health", get(handlers::health_check))
        .route("/health/ready", get(handlers::readiness))
        .route("/metrics", get(handlers::metrics))
        .route("/api/v1/prompt", post(handlers::submit_prompt))
        .layer(TraceLayer::new_for_http())
        .layer(request_id_layer())
        .with_state(state)
}
