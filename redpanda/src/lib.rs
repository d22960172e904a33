//! Redpanda bus client for the Aether gateway.
//!
//! This crate provides [`RedpandaBusClient`], the production implementation of
//! the [`MessageBus`] trait from `aether-core`. It uses rdkafka, so it works with
//! Redpanda, Apache Kafka and other Kafka-compatible brokers.
//!
//! # Architecture
//!
//! ```text
//!              publish(topic, envelope, key)
//!                         │
//!                         ▼
//!  ┌─────────────────────────────────────────┐
//!  │ FutureProducer (idempotent, acks=all)   │ shared by all callers
//!  └────────────────────┬────────────────────┘
//!                       ▼
//!                 [ Redpanda ]
//!                       │
//!       ┌───────────────┼───────────────┐
//!       ▼               ▼               ▼
//!  ┌──────────┐   ┌──────────┐   ┌──────────┐
//!  │ group A  │   │ group B  │   │   ...    │ one StreamConsumer + task per group
//!  └────┬─────┘   └────┬─────┘   └──────────┘
//!       ▼              ▼
//!    deliver()      deliver()  → MessageHandler::handle
//! ```
//!
//! # Delivery Semantics
//!
//! **At-least-once delivery** with manual offset commits:
//! - An offset is committed only after its message has been handed to the handler
//!   (or skipped as malformed)
//! - If the process crashes before commit, the message is redelivered
//! - Handlers must tolerate duplicates; the correlation registry does
//!
//! # Example
//!
//! ```no_run
//! use aether_core::MessageBus;
//! use aether_redpanda::RedpandaBusClient;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = RedpandaBusClient::builder()
//!     .brokers("localhost:9092")
//!     .client_id("aether-gateway")
//!     .service_name("nodejs-api")
//!     .build()?;
//!
//! bus.connect().await?;
//! let envelope = bus.create_envelope("USER_PROMPT_CREATE", json!({"prompt": "hi"}), None);
//! bus.publish("user.prompt.create", &envelope, None).await?;
//! bus.disconnect().await;
//! # Ok(())
//! # }
//! ```

pub mod security;

pub use security::SecurityConfig;

use aether_core::{
    BusError, BusFuture, ConsumerGroupState, EventEnvelope, MessageBus, MessageHandler,
    MessageHeaders, SubscribeOutcome, deliver,
};
use aether_runtime::retry::{RetryPolicy, retry_with_backoff};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_METADATA_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_millis(30_000);
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(3_000);
const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// One registered consumer group.
struct ConsumerGroup {
    topics: Vec<String>,
    state: ConsumerGroupState,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Redpanda implementation of [`MessageBus`].
///
/// Owns one idempotent producer, created on [`connect`](MessageBus::connect), and one
/// consumer per registered group. Construct it once at startup and share it as
/// `Arc<dyn MessageBus>`; its lifecycle ends with an explicit
/// [`disconnect`](MessageBus::disconnect).
///
/// # Configuration
///
/// - **Brokers**: bootstrap servers (required)
/// - **Client id / service name**: librdkafka `client.id` and envelope `source`
/// - **Connect retry**: exponential backoff, 100ms initial delay, 8 retries
/// - **Consumer sessions**: 30s session timeout, 3s heartbeat, `latest` offset reset
/// - **Security**: optional TLS/SASL via [`SecurityConfig`]
pub struct RedpandaBusClient {
    brokers: String,
    client_id: String,
    service_name: String,
    send_timeout: Duration,
    metadata_timeout: Duration,
    retry_policy: RetryPolicy,
    session_timeout: Duration,
    heartbeat_interval: Duration,
    auto_offset_reset: String,
    shutdown_grace: Duration,
    security: SecurityConfig,
    producer: RwLock<Option<FutureProducer>>,
    connected: AtomicBool,
    connect_lock: tokio::sync::Mutex<()>,
    groups: Mutex<HashMap<String, ConsumerGroup>>,
}

impl RedpandaBusClient {
    /// Create a new builder for configuring the client.
    #[must_use]
    pub fn builder() -> RedpandaBusClientBuilder {
        RedpandaBusClientBuilder::default()
    }

    /// Bootstrap servers.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    /// Service name stamped as envelope `source`.
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// State of a consumer group, if registered.
    #[must_use]
    pub fn group_state(&self, group_id: &str) -> Option<ConsumerGroupState> {
        lock(&self.groups).get(group_id).map(|group| group.state)
    }

    /// Producer configuration: idempotent, all replicas acknowledge, one request
    /// in flight so retries never reorder.
    #[must_use]
    pub fn producer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("client.id", &self.client_id)
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .set("max.in.flight.requests.per.connection", "1")
            .set("message.timeout.ms", self.send_timeout.as_millis().to_string())
            .set("retry.backoff.ms", self.retry_policy.initial_delay.as_millis().to_string());
        self.security.apply(&mut config);
        config
    }

    /// Consumer configuration for `group_id`, with auto-commit off.
    #[must_use]
    pub fn consumer_config(&self, group_id: &str) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("client.id", &self.client_id)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &self.auto_offset_reset)
            .set("session.timeout.ms", self.session_timeout.as_millis().to_string())
            .set("heartbeat.interval.ms", self.heartbeat_interval.as_millis().to_string())
            .set("enable.partition.eof", "false");
        self.security.apply(&mut config);
        config
    }

    fn current_producer(&self) -> Option<FutureProducer> {
        self.producer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn dial(&self) -> Result<(), BusError> {
        let _guard = self.connect_lock.lock().await;
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }

        let producer: FutureProducer = self
            .producer_config()
            .create()
            .map_err(|e| BusError::ConnectionFailed(format!("Failed to create producer: {e}")))?;

        let metadata_timeout = self.metadata_timeout;
        let broker_count = retry_with_backoff(&self.retry_policy, "fetch broker metadata", || {
            let probe = producer.clone();
            async move {
                tokio::task::spawn_blocking(move || {
                    probe
                        .client()
                        .fetch_metadata(None, metadata_timeout)
                        .map(|metadata| metadata.brokers().len())
                        .map_err(|e| e.to_string())
                })
                .await
                .map_err(|e| e.to_string())?
            }
        })
        .await
        .map_err(|reason| {
            BusError::ConnectionFailed(format!("Brokers {} unreachable: {reason}", self.brokers))
        })?;

        *self.producer.write().unwrap_or_else(PoisonError::into_inner) = Some(producer);
        self.connected.store(true, Ordering::SeqCst);

        tracing::info!(
            brokers = %self.brokers,
            client_id = %self.client_id,
            broker_count,
            "Kafka producer connected"
        );
        Ok(())
    }
}

fn owned_headers(headers: &MessageHeaders) -> OwnedHeaders {
    headers
        .iter()
        .fold(OwnedHeaders::new_with_capacity(headers.len()), |acc, (key, value)| {
            acc.insert(Header {
                key,
                value: Some(value),
            })
        })
}

fn borrowed_headers<M: Message>(message: &M) -> MessageHeaders {
    let mut headers = MessageHeaders::new();
    if let Some(raw) = message.headers() {
        for header in raw.iter() {
            if let Some(value) = header.value {
                headers.insert_bytes(header.key, value);
            }
        }
    }
    headers
}

async fn consume_loop(
    consumer: StreamConsumer,
    group_id: String,
    handler: Arc<dyn MessageHandler>,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = &mut stop => break,
            received = consumer.recv() => match received {
                Ok(message) => {
                    let topic = message.topic().to_string();
                    let headers = borrowed_headers(&message);
                    let decoded = EventEnvelope::decode(message.payload());

                    tracing::trace!(
                        group_id = %group_id,
                        topic = %topic,
                        partition = message.partition(),
                        offset = message.offset(),
                        "Received message"
                    );

                    deliver(handler.as_ref(), &topic, decoded, headers).await;

                    // Commit after delivery: a crash before this point redelivers.
                    if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                        tracing::warn!(
                            group_id = %group_id,
                            topic = %topic,
                            partition = message.partition(),
                            offset = message.offset(),
                            error = %e,
                            "Failed to commit offset (message may be redelivered)"
                        );
                    }
                },
                Err(e) => {
                    tracing::error!(group_id = %group_id, error = %e, "Consumer error");
                },
            },
        }
    }

    consumer.unsubscribe();
    tracing::info!(group_id = %group_id, "Consumer loop stopped");
}

impl MessageBus for RedpandaBusClient {
    fn connect(&self) -> BusFuture<'_, ()> {
        Box::pin(self.dial())
    }

    fn disconnect(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let _guard = self.connect_lock.lock().await;
            let was_connected = self.connected.swap(false, Ordering::SeqCst);
            let producer = self
                .producer
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .take();

            if let Some(producer) = producer {
                match tokio::task::spawn_blocking(move || producer.flush(FLUSH_TIMEOUT)).await {
                    Ok(Ok(())) => tracing::info!("Kafka producer flushed and disconnected"),
                    Ok(Err(e)) => tracing::error!(error = %e, "Error flushing Kafka producer"),
                    Err(e) => tracing::error!(error = %e, "Producer flush task failed"),
                }
            }

            let groups: Vec<(String, ConsumerGroup)> = lock(&self.groups).drain().collect();
            for (group_id, mut group) in groups {
                if let Some(stop) = group.stop.take() {
                    let _ = stop.send(());
                }
                if let Some(task) = group.task.take() {
                    match tokio::time::timeout(self.shutdown_grace, task).await {
                        Ok(Ok(())) => {
                            tracing::info!(group_id = %group_id, "Kafka consumer disconnected");
                        },
                        Ok(Err(e)) => {
                            tracing::error!(group_id = %group_id, error = %e, "Consumer task failed");
                        },
                        Err(_) => {
                            tracing::error!(
                                group_id = %group_id,
                                grace_ms = self.shutdown_grace.as_millis(),
                                "Consumer did not stop within grace period"
                            );
                        },
                    }
                }
                group.state = ConsumerGroupState::Disconnected;
                tracing::debug!(
                    group_id = %group_id,
                    topics = ?group.topics,
                    state = %group.state,
                    "Consumer group removed"
                );
            }

            if was_connected {
                tracing::info!("Kafka client disconnected");
            }
        })
    }

    fn create_envelope(
        &self,
        event_type: &str,
        payload: serde_json::Value,
        destination: Option<&str>,
    ) -> EventEnvelope {
        EventEnvelope::new(&self.service_name, event_type, payload, destination)
    }

    fn publish<'a>(
        &'a self,
        topic: &'a str,
        envelope: &'a EventEnvelope,
        key: Option<&'a str>,
    ) -> BusFuture<'a, ()> {
        Box::pin(async move {
            if !self.connected.load(Ordering::SeqCst) {
                self.dial().await?;
            }
            let producer = self
                .current_producer()
                .ok_or_else(|| BusError::ConnectionFailed("Producer is not connected".to_string()))?;

            let payload = envelope.to_bytes()?;
            let key = key.unwrap_or(envelope.message_id.as_str());
            let record = FutureRecord::to(topic)
                .payload(&payload)
                .key(key)
                .headers(owned_headers(&MessageHeaders::from_envelope(envelope)));

            match producer.send(record, Timeout::After(self.send_timeout)).await {
                Ok((partition, offset)) => {
                    tracing::info!(
                        topic = %topic,
                        partition,
                        offset,
                        event_type = %envelope.event_type,
                        correlation_id = ?envelope.correlation_id(),
                        "Message published"
                    );
                    Ok(())
                },
                Err((kafka_error, _)) => {
                    tracing::error!(
                        topic = %topic,
                        event_type = %envelope.event_type,
                        error = %kafka_error,
                        "Failed to publish message"
                    );
                    Err(BusError::PublishFailed {
                        topic: topic.to_string(),
                        reason: kafka_error.to_string(),
                    })
                },
            }
        })
    }

    fn subscribe<'a>(
        &'a self,
        topics: &'a [&'a str],
        group_id: &'a str,
        handler: Arc<dyn MessageHandler>,
    ) -> BusFuture<'a, SubscribeOutcome> {
        Box::pin(async move {
            let owned_topics: Vec<String> = topics.iter().map(|t| (*t).to_string()).collect();
            let failed = |reason: String| BusError::SubscriptionFailed {
                group_id: group_id.to_string(),
                topics: owned_topics.clone(),
                reason,
            };

            let mut groups = lock(&self.groups);
            if groups.contains_key(group_id) {
                tracing::warn!(group_id = %group_id, "Consumer group already exists");
                return Ok(SubscribeOutcome::AlreadyRegistered);
            }

            let consumer: StreamConsumer = self
                .consumer_config(group_id)
                .create()
                .map_err(|e| failed(format!("Failed to create consumer: {e}")))?;
            consumer
                .subscribe(topics)
                .map_err(|e| failed(format!("Failed to subscribe to topics: {e}")))?;

            let mut group = ConsumerGroup {
                topics: owned_topics.clone(),
                state: ConsumerGroupState::Connected,
                stop: None,
                task: None,
            };

            let (stop_tx, stop_rx) = oneshot::channel();
            group.task = Some(tokio::spawn(consume_loop(
                consumer,
                group_id.to_string(),
                handler,
                stop_rx,
            )));
            group.stop = Some(stop_tx);
            group.state = ConsumerGroupState::Running;
            groups.insert(group_id.to_string(), group);
            drop(groups);

            tracing::info!(
                group_id = %group_id,
                topics = ?owned_topics,
                auto_offset_reset = %self.auto_offset_reset,
                manual_commit = true,
                "Kafka consumer subscribed and running"
            );
            Ok(SubscribeOutcome::Registered)
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn active_consumers(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.groups).keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Builder for configuring a [`RedpandaBusClient`].
///
/// # Example
///
/// ```no_run
/// use aether_redpanda::{RedpandaBusClient, SecurityConfig};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = RedpandaBusClient::builder()
///     .brokers("broker-1:9092,broker-2:9092")
///     .client_id("aether-gateway")
///     .service_name("nodejs-api")
///     .send_timeout(Duration::from_secs(10))
///     .security(SecurityConfig {
///         protocol: Some("sasl_ssl".to_string()),
///         ..SecurityConfig::default()
///     })
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct RedpandaBusClientBuilder {
    brokers: Option<String>,
    client_id: Option<String>,
    service_name: Option<String>,
    send_timeout: Option<Duration>,
    metadata_timeout: Option<Duration>,
    retry_policy: Option<RetryPolicy>,
    session_timeout: Option<Duration>,
    heartbeat_interval: Option<Duration>,
    auto_offset_reset: Option<String>,
    shutdown_grace: Option<Duration>,
    security: SecurityConfig,
}

impl RedpandaBusClientBuilder {
    /// Comma-separated list of broker addresses (e.g., "localhost:9092").
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// librdkafka `client.id`. Default: `aether-gateway`.
    #[must_use]
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Logical service name used as envelope `source`. Defaults to the client id.
    #[must_use]
    pub fn service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = Some(service_name.into());
        self
    }

    /// Producer send timeout. Default: 5 seconds.
    #[must_use]
    pub const fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    /// Timeout of each broker metadata probe during connect. Default: 5 seconds.
    #[must_use]
    pub const fn metadata_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_timeout = Some(timeout);
        self
    }

    /// Backoff used while connecting. Default: 100ms initial delay, 8 retries.
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Consumer session timeout. Default: 30 seconds.
    #[must_use]
    pub const fn session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = Some(timeout);
        self
    }

    /// Consumer heartbeat interval. Default: 3 seconds.
    #[must_use]
    pub const fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Where new consumer groups start reading: `"latest"` (default) or `"earliest"`.
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// How long `disconnect` waits for each consume loop. Default: 10 seconds.
    #[must_use]
    pub const fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = Some(grace);
        self
    }

    /// TLS/SASL settings applied to producer and consumers.
    #[must_use]
    pub fn security(mut self, security: SecurityConfig) -> Self {
        self.security = security;
        self
    }

    /// Build the [`RedpandaBusClient`]. No network I/O happens until `connect`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::ConnectionFailed`] if brokers are not set.
    pub fn build(self) -> Result<RedpandaBusClient, BusError> {
        let brokers = self
            .brokers
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| BusError::ConnectionFailed("Brokers not configured".to_string()))?;
        let client_id = self.client_id.unwrap_or_else(|| "aether-gateway".to_string());
        let service_name = self.service_name.unwrap_or_else(|| client_id.clone());
        let auto_offset_reset = self
            .auto_offset_reset
            .unwrap_or_else(|| "latest".to_string());

        tracing::info!(
            brokers = %brokers,
            client_id = %client_id,
            service_name = %service_name,
            auto_offset_reset = %auto_offset_reset,
            secured = self.security.is_configured(),
            "RedpandaBusClient created"
        );

        Ok(RedpandaBusClient {
            brokers,
            client_id,
            service_name,
            send_timeout: self.send_timeout.unwrap_or(DEFAULT_SEND_TIMEOUT),
            metadata_timeout: self.metadata_timeout.unwrap_or(DEFAULT_METADATA_TIMEOUT),
            retry_policy: self.retry_policy.unwrap_or_default(),
            session_timeout: self.session_timeout.unwrap_or(DEFAULT_SESSION_TIMEOUT),
            heartbeat_interval: self.heartbeat_interval.unwrap_or(DEFAULT_HEARTBEAT_INTERVAL),
            auto_offset_reset,
            shutdown_grace: self.shutdown_grace.unwrap_or(DEFAULT_SHUTDOWN_GRACE),
            security: self.security,
            producer: RwLock::new(None),
            connected: AtomicBool::new(false),
            connect_lock: tokio::sync::Mutex::new(()),
            groups: Mutex::new(HashMap::new()),
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)] // Panics: Tests fail loudly on builder errors
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> RedpandaBusClient {
        RedpandaBusClient::builder()
            .brokers("localhost:9092")
            .client_id("test-client")
            .service_name("nodejs-api")
            .build()
            .expect("builder should succeed")
    }

    #[test]
    fn redpanda_bus_client_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RedpandaBusClient>();
        assert_sync::<RedpandaBusClient>();
    }

    #[test]
    fn build_requires_brokers() {
        let result = RedpandaBusClient::builder().build();
        assert!(matches!(result, Err(BusError::ConnectionFailed(_))));

        let blank = RedpandaBusClient::builder().brokers("  ").build();
        assert!(blank.is_err());
    }

    #[test]
    fn producer_is_idempotent() {
        let config = client().producer_config();

        assert_eq!(config.get("enable.idempotence"), Some("true"));
        assert_eq!(config.get("acks"), Some("all"));
        assert_eq!(config.get("max.in.flight.requests.per.connection"), Some("1"));
        assert_eq!(config.get("client.id"), Some("test-client"));
        assert_eq!(config.get("retry.backoff.ms"), Some("100"));
    }

    #[test]
    fn consumer_commits_manually_with_session_settings() {
        let config = client().consumer_config("gateway-llm-response");

        assert_eq!(config.get("group.id"), Some("gateway-llm-response"));
        assert_eq!(config.get("enable.auto.commit"), Some("false"));
        assert_eq!(config.get("auto.offset.reset"), Some("latest"));
        assert_eq!(config.get("session.timeout.ms"), Some("30000"));
        assert_eq!(config.get("heartbeat.interval.ms"), Some("3000"));
    }

    #[test]
    fn security_settings_reach_both_sides() {
        let bus = RedpandaBusClient::builder()
            .brokers("localhost:9092")
            .security(SecurityConfig {
                protocol: Some("ssl".to_string()),
                ca_location: Some("/etc/ca.pem".to_string()),
                ..SecurityConfig::default()
            })
            .build()
            .expect("builder should succeed");

        assert_eq!(bus.producer_config().get("security.protocol"), Some("ssl"));
        assert_eq!(bus.consumer_config("g").get("ssl.ca.location"), Some("/etc/ca.pem"));
    }

    #[test]
    fn create_envelope_uses_service_name() {
        let bus = client();
        let envelope = bus.create_envelope(
            "USER_PROMPT_CREATE",
            json!({"prompt": "hi"}),
            Some("python-ai-service"),
        );

        assert_eq!(envelope.source, "nodejs-api");
        assert_eq!(envelope.destination.as_deref(), Some("python-ai-service"));
        assert!(envelope.correlation_id().is_some());
        assert!(!bus.is_connected());
    }

    #[test]
    fn service_name_defaults_to_client_id() {
        let bus = RedpandaBusClient::builder()
            .brokers("localhost:9092")
            .client_id("only-id")
            .build()
            .expect("builder should succeed");
        assert_eq!(bus.service_name(), "only-id");
    }

    #[test]
    fn headers_round_trip_through_rdkafka_types() {
        let envelope = client().create_envelope("PING", json!({}), None);
        let owned = owned_headers(&MessageHeaders::from_envelope(&envelope));

        assert_eq!(owned.count(), 4);
        let event_type = owned
            .iter()
            .find(|h| h.key == "event-type")
            .and_then(|h| h.value)
            .expect("event-type header present");
        assert_eq!(event_type, b"PING");
    }

    #[tokio::test]
    async fn disconnect_without_connect_is_a_no_op() {
        let bus = client();
        bus.disconnect().await;
        bus.disconnect().await;
        assert!(!bus.is_connected());
        assert!(bus.active_consumers().is_empty());
    }
}
