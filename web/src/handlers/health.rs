//! Health check endpoints.
//!
//! These endpoints are used by load balancers and monitoring systems
//! to verify service health.

use crate::response::ApiResponse;
use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

/// Greeting served at the root path.
pub const WELCOME_MESSAGE: &str = "Welcome to Aether Rag API Service";

/// Root greeting.
///
/// ```text
/// GET /
/// ```
#[allow(clippy::unused_async)]
pub async fn welcome() -> ApiResponse<&'static str> {
    ApiResponse::success(WELCOME_MESSAGE)
}

/// Liveness check.
///
/// Returns 200 OK while the process is serving. Does not look at the bus.
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Body of the readiness probe.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Readiness {
    /// Whether the bus producer is connected.
    pub connected: bool,
    /// Consumer groups with a running consume loop.
    pub consumers: Vec<String>,
    /// Calls waiting for a response.
    pub pending_calls: usize,
}

/// Readiness check.
///
/// # Status Codes
///
/// - 200 OK: bus connected
/// - 503 Service Unavailable: bus not connected
///
/// ```text
/// GET /health/ready
/// ```
///
/// ```json
/// { "connected": true, "consumers": ["gateway-llm-response"], "pendingCalls": 0 }
/// ```
#[allow(clippy::unused_async)]
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    let bus = state.bridge.bus();
    let mut consumers = bus.active_consumers();
    consumers.sort();

    let readiness = Readiness {
        connected: bus.is_connected(),
        consumers,
        pending_calls: state.bridge.pending_count(),
    };

    let status = if readiness.connected {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(readiness))
}
