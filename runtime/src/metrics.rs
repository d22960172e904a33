//! Prometheus metrics for the correlation layer.
//!
//! Metrics are recorded through the `metrics` facade, so they are free when no
//! recorder is installed (tests, embedded use). The gateway binary installs the
//! Prometheus recorder once with [`install_prometheus_recorder`] and serves
//! [`PrometheusHandle::render`] from its `/metrics` route.
//!
//! Recorded series:
//! - `bridge_calls_total{outcome}`
//! - `bridge_call_duration_seconds`
//! - `bridge_pending_calls`
//! - `dispatcher_messages_total{outcome}`

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, gauge, histogram};

/// Errors from metrics setup.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Install the process-wide Prometheus recorder and describe every series.
///
/// # Errors
///
/// Returns [`MetricsError::Install`] if a recorder is already installed.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle, MetricsError> {
    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0],
        )
        .map_err(|e| MetricsError::Build(e.to_string()))?;

    let handle = builder
        .install_recorder()
        .map_err(|e| MetricsError::Install(e.to_string()))?;

    describe_metrics();
    tracing::info!("Prometheus metrics recorder installed");
    Ok(handle)
}

/// Register descriptions for every series this crate records.
pub fn describe_metrics() {
    describe_counter!(
        "bridge_calls_total",
        "Total number of bridged calls by outcome"
    );
    describe_histogram!(
        "bridge_call_duration_seconds",
        "Time from publishing a request to its resolution or timeout"
    );
    describe_gauge!(
        "bridge_pending_calls",
        "Number of calls currently waiting for a response"
    );
    describe_counter!(
        "dispatcher_messages_total",
        "Total number of response messages seen by the dispatcher by outcome"
    );
}

/// Bridge call recorder.
pub struct BridgeMetrics;

impl BridgeMetrics {
    /// Record a finished call.
    pub fn record_call(outcome: &'static str, duration: Duration) {
        counter!("bridge_calls_total", "outcome" => outcome).increment(1);
        histogram!("bridge_call_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record the current number of pending calls.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_pending(count: usize) {
        gauge!("bridge_pending_calls").set(count as f64);
    }
}

/// Dispatcher recorder.
pub struct DispatcherMetrics;

impl DispatcherMetrics {
    /// Record one inbound response message.
    pub fn record_message(outcome: &'static str) {
        counter!("dispatcher_messages_total", "outcome" => outcome).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_a_recorder_is_a_no_op() {
        describe_metrics();
        BridgeMetrics::record_call("success", Duration::from_millis(3));
        BridgeMetrics::record_pending(2);
        DispatcherMetrics::record_message("resolved");
    }
}
