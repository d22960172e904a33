//! Application state for Axum handlers.

use aether_runtime::RequestBridge;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    /// Bridge used to turn HTTP requests into bus calls.
    pub bridge: Arc<RequestBridge>,
    /// Prometheus handle; `/metrics` answers 503 when absent.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create state around a bridge, without a metrics handle.
    #[must_use]
    pub const fn new(bridge: Arc<RequestBridge>) -> Self {
        Self {
            bridge,
            metrics: None,
        }
    }

    /// Attach the Prometheus handle served at `/metrics`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
