//! Message bus abstraction.
//!
//! This module provides the [`MessageBus`] trait that the gateway uses to talk to its
//! asynchronous backend, and the [`MessageHandler`] trait that consumers implement.
//! The bus knows nothing about request/response correlation; it only moves
//! [`EventEnvelope`]s between topics.
//!
//! # Architecture
//!
//! ```text
//!  publish(topic, envelope, key)            subscribe(topics, group, handler)
//!            │                                          ▲
//!            ▼                                          │
//! ┌──────────────────────┐   bytes + headers   ┌───────────────────────┐
//! │   Producer (shared)  │ ──────► bus ──────► │ Consume loop per group│
//! └──────────────────────┘                     │  decode → deliver()   │
//!                                              └───────────┬───────────┘
//!                                                          ▼
//!                                                  MessageHandler::handle
//! ```
//!
//! # Delivery Rules
//!
//! Every implementation routes consumed bytes through [`deliver`], which gives all
//! buses the same guarantees:
//!
//! - Empty or non-JSON payloads are logged and skipped
//! - Handler errors are logged and swallowed
//! - Nothing that happens to one message stops the consume loop
//!
//! # Implementations
//!
//! - `InMemoryBus` in `aether-testing` - For tests (no broker)
//! - `RedpandaBusClient` in `aether-redpanda` - For production (Kafka-compatible)

use crate::envelope::EventEnvelope;
use crate::headers::MessageHeaders;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during message bus operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The bus could not be reached (after the client's own retries).
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Sending a message failed.
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Creating or subscribing a consumer group failed.
    #[error("Subscription failed for group '{group_id}' on topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The consumer group
        group_id: String,
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// A consumed message had no body.
    #[error("Received empty message")]
    EmptyMessage,

    /// A consumed message could not be parsed as an envelope.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// An envelope could not be serialized.
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

/// Error type returned by message handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Boxed future returned by bus operations.
pub type BusFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BusError>> + Send + 'a>>;

/// Result of a subscribe call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// A new consumer group was created and its consume loop started.
    Registered,
    /// The group already existed; nothing changed.
    AlreadyRegistered,
}

/// Lifecycle of a consumer group registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerGroupState {
    /// Consumer created and subscribed, loop not yet started.
    Connected,
    /// Consume loop running.
    Running,
    /// Torn down.
    Disconnected,
}

impl fmt::Display for ConsumerGroupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::Running => write!(f, "running"),
            Self::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Callback invoked for each envelope consumed by a subscription.
///
/// Handlers run inside the consume loop of their group, one message at a time.
/// Returning an error only produces a log line; it never stops the loop.
///
/// Any `Fn(String, EventEnvelope, MessageHeaders) -> impl Future<Output = Result<(), HandlerError>>`
/// closure is a handler.
///
/// # Example
///
/// ```
/// use aether_core::bus::{HandlerError, MessageHandler};
/// use aether_core::envelope::EventEnvelope;
/// use aether_core::headers::MessageHeaders;
/// use std::sync::Arc;
///
/// let handler: Arc<dyn MessageHandler> = Arc::new(
///     |topic: String, envelope: EventEnvelope, _headers: MessageHeaders| async move {
///         println!("{topic}: {}", envelope.event_type);
///         Ok::<(), HandlerError>(())
///     },
/// );
/// ```
pub trait MessageHandler: Send + Sync {
    /// Handle one envelope consumed from `topic`.
    ///
    /// # Errors
    ///
    /// Any error is logged by the consume loop and otherwise ignored.
    fn handle(
        &self,
        topic: String,
        envelope: EventEnvelope,
        headers: MessageHeaders,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + '_>>;
}

impl<F, Fut> MessageHandler for F
where
    F: Fn(String, EventEnvelope, MessageHeaders) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn handle(
        &self,
        topic: String,
        envelope: EventEnvelope,
        headers: MessageHeaders,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + '_>> {
        Box::pin(self(topic, envelope, headers))
    }
}

/// Trait for message bus clients.
///
/// # Thread Safety
///
/// Implementations are shared as `Arc<dyn MessageBus>` between HTTP handlers and
/// background tasks, so `publish` must be safe to call concurrently.
///
/// # Dyn Compatibility
///
/// Methods return boxed futures instead of using `async fn` so the trait can be
/// used as a trait object.
pub trait MessageBus: Send + Sync {
    /// Establish the producer connection.
    ///
    /// Calling this when already connected is a no-op and does not re-dial.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::ConnectionFailed`] if the bus stays unreachable after the
    /// client's retry policy is exhausted.
    fn connect(&self) -> BusFuture<'_, ()>;

    /// Tear down the producer and every consumer group.
    ///
    /// Best-effort and safe to call repeatedly: failures tearing down one group are
    /// logged and do not prevent the others from being stopped.
    fn disconnect(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;

    /// Build an envelope stamped with this client's service name.
    ///
    /// Pure: the envelope gets a fresh message id and a fresh correlation id.
    fn create_envelope(
        &self,
        event_type: &str,
        payload: serde_json::Value,
        destination: Option<&str>,
    ) -> EventEnvelope;

    /// Serialize and send `envelope` to `topic`.
    ///
    /// The send key defaults to the envelope's message id. Connects lazily if the
    /// producer is not connected yet.
    ///
    /// # Errors
    ///
    /// - [`BusError::ConnectionFailed`] if the lazy connect fails
    /// - [`BusError::PublishFailed`] on transport failure
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        envelope: &'a EventEnvelope,
        key: Option<&'a str>,
    ) -> BusFuture<'a, ()>;

    /// Register a consumer group on `topics` and start its consume loop.
    ///
    /// Idempotent per `group_id`: a second call with an existing group is logged and
    /// returns [`SubscribeOutcome::AlreadyRegistered`] without creating a consumer.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::SubscriptionFailed`] if the consumer cannot be created.
    fn subscribe<'a>(
        &'a self,
        topics: &'a [&'a str],
        group_id: &'a str,
        handler: Arc<dyn MessageHandler>,
    ) -> BusFuture<'a, SubscribeOutcome>;

    /// Whether the producer is currently connected.
    fn is_connected(&self) -> bool;

    /// Group ids of the registered consumer groups.
    fn active_consumers(&self) -> Vec<String>;
}

/// What happened to one consumed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The handler ran and returned `Ok`.
    Handled,
    /// The message was empty or malformed and never reached the handler.
    Skipped,
    /// The handler returned an error.
    HandlerFailed,
}

/// Hand one consumed message to `handler`, containing every failure.
///
/// `decoded` is the result of [`EventEnvelope::decode`] on the raw payload. Decode
/// failures are logged and skipped; handler failures are logged and swallowed.
pub async fn deliver(
    handler: &dyn MessageHandler,
    topic: &str,
    decoded: Result<EventEnvelope, BusError>,
    headers: MessageHeaders,
) -> DeliveryOutcome {
    let envelope = match decoded {
        Ok(envelope) => envelope,
        Err(BusError::EmptyMessage) => {
            tracing::warn!(topic = %topic, "Received empty message value, skipping");
            return DeliveryOutcome::Skipped;
        },
        Err(e) => {
            tracing::error!(topic = %topic, error = %e, "Dropping malformed message");
            return DeliveryOutcome::Skipped;
        },
    };

    tracing::debug!(
        topic = %topic,
        message_id = %envelope.message_id,
        event_type = %envelope.event_type,
        correlation_id = ?envelope.correlation_id(),
        "Processing message"
    );

    let message_id = envelope.message_id.clone();
    match handler.handle(topic.to_string(), envelope, headers).await {
        Ok(()) => DeliveryOutcome::Handled,
        Err(e) => {
            tracing::error!(
                topic = %topic,
                message_id = %message_id,
                error = %e,
                "Error processing message"
            );
            DeliveryOutcome::HandlerFailed
        },
    }
}
