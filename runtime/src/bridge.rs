//! Request/response bridge over a fire-and-forget message bus.
//!
//! [`RequestBridge::call`] publishes a request envelope carrying a fresh
//! correlation id and suspends until the [`InboundDispatcher`] resolves that id or
//! the deadline passes:
//!
//! ```text
//! call(event_type, payload, timeout)
//!   │ 1. create_envelope      (fresh correlation id)
//!   │ 2. registry.register    (before publish, so a fast reply is never lost)
//!   │ 3. bus.publish          (failure cancels the entry)
//!   │ 4. pending.wait         ◄── dispatcher.resolve(correlation id)
//!   ▼
//! Result<Value, BridgeError>
//! ```
//!
//! Calls are independent: each has its own correlation id and deadline, and
//! nothing serializes one call against another.
//!
//! [`InboundDispatcher`]: crate::dispatcher::InboundDispatcher

use crate::dispatcher::{InboundDispatcher, ResponseExtractor};
use crate::metrics::BridgeMetrics;
use crate::registry::{CorrelationRegistry, RegistryError};
use aether_core::{BusError, CorrelationId, MessageBus};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Default time a call waits for its response.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Failure reported by the backend in a response envelope.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{event_type}: {message}")]
pub struct RemoteFailure {
    /// Event type of the response that carried the failure
    pub event_type: String,
    /// Message reported by the backend
    pub message: String,
}

/// What the dispatcher hands to a waiting caller.
pub type CallOutcome = Result<Value, RemoteFailure>;

/// Errors surfaced to bridge callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Publishing the request failed; the pending entry was cancelled.
    #[error("Failed to publish request: {0}")]
    Publish(#[from] BusError),

    /// No response arrived within the timeout.
    #[error("No response for {correlation_id} within {timeout:?}")]
    ResponseTimeout {
        /// Correlation id of the request
        correlation_id: CorrelationId,
        /// Timeout the call was issued with
        timeout: Duration,
    },

    /// The correlation id was already pending.
    #[error("Correlation id {0} is already pending")]
    DuplicateCorrelation(CorrelationId),

    /// The backend answered with a failure.
    #[error("Remote failure: {0}")]
    Remote(RemoteFailure),

    /// No request topic is configured for the event type.
    #[error("No request topic configured for event type '{0}'")]
    NoRoute(String),

    /// The pending entry disappeared without a result.
    #[error("Call {0} closed without a response")]
    Closed(CorrelationId),
}

impl BridgeError {
    /// Label used for the `outcome` metric dimension.
    #[must_use]
    pub const fn outcome(&self) -> &'static str {
        match self {
            Self::Publish(_) => "publish_error",
            Self::ResponseTimeout { .. } => "timeout",
            Self::DuplicateCorrelation(_) => "duplicate",
            Self::Remote(_) => "remote_error",
            Self::NoRoute(_) => "no_route",
            Self::Closed(_) => "closed",
        }
    }
}

impl From<RegistryError> for BridgeError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::DuplicateCorrelation(id) => Self::DuplicateCorrelation(id),
            RegistryError::ResponseTimeout {
                correlation_id,
                timeout,
            } => Self::ResponseTimeout {
                correlation_id,
                timeout,
            },
            RegistryError::Closed(id) => Self::Closed(id),
        }
    }
}

/// Turns bus publishes into calls that return the correlated response.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct RequestBridge {
    bus: Arc<dyn MessageBus>,
    registry: CorrelationRegistry<CallOutcome>,
    routes: HashMap<String, String>,
    default_topic: Option<String>,
    destination: Option<String>,
    default_timeout: Duration,
}

impl RequestBridge {
    /// Start building a bridge over `bus`.
    #[must_use]
    pub fn builder(bus: Arc<dyn MessageBus>) -> RequestBridgeBuilder {
        RequestBridgeBuilder {
            bus,
            registry: None,
            routes: HashMap::new(),
            default_topic: None,
            destination: None,
            default_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// The registry shared with this bridge's dispatchers.
    #[must_use]
    pub fn registry(&self) -> &CorrelationRegistry<CallOutcome> {
        &self.registry
    }

    /// The underlying bus.
    #[must_use]
    pub fn bus(&self) -> &Arc<dyn MessageBus> {
        &self.bus
    }

    /// A dispatcher resolving this bridge's calls, using the LLM response shape.
    #[must_use]
    pub fn dispatcher(&self) -> InboundDispatcher {
        InboundDispatcher::new(self.registry.clone())
    }

    /// A dispatcher resolving this bridge's calls with a custom extractor.
    #[must_use]
    pub fn dispatcher_with(&self, extractor: Arc<dyn ResponseExtractor>) -> InboundDispatcher {
        InboundDispatcher::with_extractor(self.registry.clone(), extractor)
    }

    /// Number of calls waiting for a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.registry.pending_count()
    }

    /// Timeout used by [`call_default`](Self::call_default).
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Request topic for `event_type`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NoRoute`] when neither a route nor a default topic exists.
    pub fn topic_for(&self, event_type: &str) -> Result<&str, BridgeError> {
        self.routes
            .get(event_type)
            .or(self.default_topic.as_ref())
            .map(String::as_str)
            .ok_or_else(|| BridgeError::NoRoute(event_type.to_string()))
    }

    /// Call with the configured default timeout.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn call_default(&self, event_type: &str, payload: Value) -> Result<Value, BridgeError> {
        self.call(event_type, payload, self.default_timeout).await
    }

    /// Publish `payload` as an `event_type` request and wait for its response.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::NoRoute`] if no request topic is configured for `event_type`
    /// - [`BridgeError::Publish`] if the publish fails (the pending entry is cancelled)
    /// - [`BridgeError::ResponseTimeout`] if no response arrives within `timeout`
    /// - [`BridgeError::Remote`] if the backend answered with a failure
    pub async fn call(
        &self,
        event_type: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, BridgeError> {
        let started = Instant::now();
        let result = self.execute(event_type, payload, timeout).await;

        let outcome = result.as_ref().map_or_else(BridgeError::outcome, |_| "success");
        BridgeMetrics::record_call(outcome, started.elapsed());
        result
    }

    async fn execute(
        &self,
        event_type: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, BridgeError> {
        let topic = self.topic_for(event_type)?;

        let mut envelope = self
            .bus
            .create_envelope(event_type, payload, self.destination.as_deref());
        let correlation_id = if let Some(id) = envelope.correlation_id() {
            id.clone()
        } else {
            let id = CorrelationId::new();
            envelope = envelope.with_correlation_id(id.clone());
            id
        };

        let pending = self.registry.register(correlation_id.clone(), timeout)?;

        if let Err(error) = self.bus.publish(topic, &envelope, None).await {
            pending.cancel();
            tracing::error!(
                topic = %topic,
                event_type = %event_type,
                correlation_id = %correlation_id,
                error = %error,
                "Failed to publish request"
            );
            return Err(BridgeError::Publish(error));
        }

        tracing::info!(
            topic = %topic,
            event_type = %event_type,
            correlation_id = %correlation_id,
            timeout_ms = timeout.as_millis(),
            "Request published, awaiting response"
        );

        pending.wait().await?.map_err(BridgeError::Remote)
    }
}

impl std::fmt::Debug for RequestBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBridge")
            .field("routes", &self.routes)
            .field("default_topic", &self.default_topic)
            .field("destination", &self.destination)
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

/// Builder for [`RequestBridge`].
pub struct RequestBridgeBuilder {
    bus: Arc<dyn MessageBus>,
    registry: Option<CorrelationRegistry<CallOutcome>>,
    routes: HashMap<String, String>,
    default_topic: Option<String>,
    destination: Option<String>,
    default_timeout: Duration,
}

impl RequestBridgeBuilder {
    /// Route `event_type` requests to `topic`.
    #[must_use]
    pub fn route(mut self, event_type: impl Into<String>, topic: impl Into<String>) -> Self {
        self.routes.insert(event_type.into(), topic.into());
        self
    }

    /// Topic for event types without an explicit route.
    #[must_use]
    pub fn default_topic(mut self, topic: impl Into<String>) -> Self {
        self.default_topic = Some(topic.into());
        self
    }

    /// Destination service stamped on every request envelope.
    #[must_use]
    pub fn destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// Timeout used by [`RequestBridge::call_default`].
    #[must_use]
    pub const fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Share an existing registry instead of creating one.
    #[must_use]
    pub fn registry(mut self, registry: CorrelationRegistry<CallOutcome>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Build the bridge.
    #[must_use]
    pub fn build(self) -> RequestBridge {
        RequestBridge {
            bus: self.bus,
            registry: self.registry.unwrap_or_default(),
            routes: self.routes,
            default_topic: self.default_topic,
            destination: self.destination,
            default_timeout: self.default_timeout,
        }
    }
}
