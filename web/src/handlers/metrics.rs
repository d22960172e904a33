//! Prometheus scrape endpoint.

use crate::WebResult;
use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::State, http::header, response::IntoResponse};

/// Render the installed recorder in Prometheus text format.
///
/// ```text
/// GET /metrics
/// ```
///
/// # Errors
///
/// Returns 503 when no recorder handle was installed.
#[allow(clippy::unused_async)]
pub async fn metrics(State(state): State<AppState>) -> WebResult<impl IntoResponse> {
    let handle = state
        .metrics
        .as_ref()
        .ok_or_else(|| AppError::unavailable("Metrics recorder is not installed"))?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    ))
}
