//! In-memory message bus for broker-free tests.
//!
//! [`InMemoryBus`] implements [`MessageBus`] with the same delivery rules as the
//! Redpanda client: each consumer group runs one consume task that decodes raw
//! bytes and hands them to [`deliver`], so malformed messages and handler errors
//! are contained exactly as in production.
//!
//! Every publish is recorded for assertions, and [`InMemoryBus::drain`] waits until
//! every group has processed everything published so far.

use aether_core::{
    BusError, BusFuture, ConsumerGroupState, DeliveryOutcome, EventEnvelope, MessageBus,
    MessageHandler, MessageHeaders, SubscribeOutcome, deliver,
};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// A message captured by [`InMemoryBus::published`].
#[derive(Debug, Clone)]
pub struct PublishedRecord {
    /// Destination topic
    pub topic: String,
    /// Send key (the message id unless supplied)
    pub key: String,
    /// The envelope as sent
    pub envelope: EventEnvelope,
    /// Headers sent alongside
    pub headers: MessageHeaders,
}

enum Delivery {
    Message {
        topic: String,
        bytes: Option<Vec<u8>>,
        headers: MessageHeaders,
    },
    Barrier(oneshot::Sender<()>),
}

struct Group {
    topics: Vec<String>,
    state: ConsumerGroupState,
    sender: mpsc::UnboundedSender<Delivery>,
    task: JoinHandle<()>,
}

struct Inner {
    service_name: String,
    connected: AtomicBool,
    fail_connect: AtomicBool,
    fail_publish: AtomicBool,
    connect_calls: AtomicUsize,
    handled: AtomicUsize,
    groups: Mutex<HashMap<String, Group>>,
    published: Mutex<Vec<PublishedRecord>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory [`MessageBus`].
///
/// Cheap to clone; clones share the same topics, groups and publish log.
///
/// # Example
///
/// ```
/// use aether_core::{EventEnvelope, MessageBus, MessageHeaders, HandlerError};
/// use aether_testing::InMemoryBus;
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = InMemoryBus::new("gateway");
/// bus.subscribe(
///     &["pings"],
///     "ping-group",
///     Arc::new(|_t: String, _e: EventEnvelope, _h: MessageHeaders| async {
///         Ok::<(), HandlerError>(())
///     }),
/// )
/// .await?;
///
/// let envelope = bus.create_envelope("PING", json!({}), None);
/// bus.publish("pings", &envelope, None).await?;
/// bus.drain().await;
///
/// assert_eq!(bus.published().len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryBus {
    inner: Arc<Inner>,
}

impl InMemoryBus {
    /// Create a disconnected bus whose envelopes are stamped with `service_name`.
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                service_name: service_name.into(),
                connected: AtomicBool::new(false),
                fail_connect: AtomicBool::new(false),
                fail_publish: AtomicBool::new(false),
                connect_calls: AtomicUsize::new(0),
                handled: AtomicUsize::new(0),
                groups: Mutex::new(HashMap::new()),
                published: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Make subsequent connects fail with [`BusError::ConnectionFailed`].
    pub fn fail_connect(&self, fail: bool) {
        self.inner.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent publishes fail with [`BusError::PublishFailed`].
    pub fn fail_publish(&self, fail: bool) {
        self.inner.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Number of times the bus actually dialed (idempotent connects excluded).
    #[must_use]
    pub fn connect_calls(&self) -> usize {
        self.inner.connect_calls.load(Ordering::SeqCst)
    }

    /// Number of messages that reached a handler, across all groups.
    #[must_use]
    pub fn handled_count(&self) -> usize {
        self.inner.handled.load(Ordering::SeqCst)
    }

    /// Every message published so far, in order.
    #[must_use]
    pub fn published(&self) -> Vec<PublishedRecord> {
        lock(&self.inner.published).clone()
    }

    /// Messages published to `topic`, in order.
    #[must_use]
    pub fn published_to(&self, topic: &str) -> Vec<PublishedRecord> {
        lock(&self.inner.published)
            .iter()
            .filter(|record| record.topic == topic)
            .cloned()
            .collect()
    }

    /// State of a consumer group, if registered.
    #[must_use]
    pub fn group_state(&self, group_id: &str) -> Option<ConsumerGroupState> {
        lock(&self.inner.groups).get(group_id).map(|group| group.state)
    }

    /// Topics a consumer group is subscribed to.
    #[must_use]
    pub fn group_topics(&self, group_id: &str) -> Option<Vec<String>> {
        lock(&self.inner.groups)
            .get(group_id)
            .map(|group| group.topics.clone())
    }

    /// Inject raw bytes on `topic`, bypassing envelope serialization.
    ///
    /// Used to feed empty or malformed messages to consumers.
    pub fn publish_raw(&self, topic: &str, bytes: Option<Vec<u8>>, headers: MessageHeaders) {
        self.fan_out(topic, bytes.as_deref(), &headers);
    }

    /// Wait until every group has processed everything published before this call.
    pub async fn drain(&self) {
        let barriers: Vec<_> = {
            let groups = lock(&self.inner.groups);
            groups
                .values()
                .filter_map(|group| {
                    let (tx, rx) = oneshot::channel();
                    group.sender.send(Delivery::Barrier(tx)).ok().map(|()| rx)
                })
                .collect()
        };

        for barrier in barriers {
            let _ = barrier.await;
        }
    }

    fn dial(&self) -> Result<(), BusError> {
        if self.inner.connected.load(Ordering::SeqCst) {
            return Ok(());
        }
        if self.inner.fail_connect.load(Ordering::SeqCst) {
            return Err(BusError::ConnectionFailed(
                "in-memory bus configured to refuse connections".to_string(),
            ));
        }
        self.inner.connect_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.connected.store(true, Ordering::SeqCst);
        tracing::debug!("In-memory bus connected");
        Ok(())
    }

    fn fan_out(&self, topic: &str, bytes: Option<&[u8]>, headers: &MessageHeaders) {
        let groups = lock(&self.inner.groups);
        for (group_id, group) in groups.iter() {
            if !group.topics.iter().any(|t| t == topic) {
                continue;
            }
            let delivery = Delivery::Message {
                topic: topic.to_string(),
                bytes: bytes.map(<[u8]>::to_vec),
                headers: headers.clone(),
            };
            if group.sender.send(delivery).is_err() {
                tracing::warn!(group_id = %group_id, topic = %topic, "Consume loop gone, message dropped");
            }
        }
    }
}

async fn consume_loop(
    inner: Arc<Inner>,
    group_id: String,
    handler: Arc<dyn MessageHandler>,
    mut receiver: mpsc::UnboundedReceiver<Delivery>,
) {
    while let Some(delivery) = receiver.recv().await {
        match delivery {
            Delivery::Message {
                topic,
                bytes,
                headers,
            } => {
                let decoded = EventEnvelope::decode(bytes.as_deref());
                let outcome = deliver(handler.as_ref(), &topic, decoded, headers).await;
                if outcome != DeliveryOutcome::Skipped {
                    inner.handled.fetch_add(1, Ordering::SeqCst);
                }
            },
            Delivery::Barrier(ack) => {
                let _ = ack.send(());
            },
        }
    }
    tracing::debug!(group_id = %group_id, "In-memory consume loop stopped");
}

impl MessageBus for InMemoryBus {
    fn connect(&self) -> BusFuture<'_, ()> {
        Box::pin(async move { self.dial() })
    }

    fn disconnect(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.inner.connected.store(false, Ordering::SeqCst);
            let groups: Vec<(String, Group)> = lock(&self.inner.groups).drain().collect();

            for (group_id, group) in groups {
                // Closing the channel ends the loop once queued messages are handled.
                drop(group.sender);
                match tokio::time::timeout(SHUTDOWN_GRACE, group.task).await {
                    Ok(Ok(())) => tracing::debug!(group_id = %group_id, "Consumer disconnected"),
                    Ok(Err(e)) => tracing::error!(group_id = %group_id, error = %e, "Consumer task failed"),
                    Err(_) => tracing::error!(group_id = %group_id, "Consumer did not stop in time"),
                }
            }
        })
    }

    fn create_envelope(
        &self,
        event_type: &str,
        payload: serde_json::Value,
        destination: Option<&str>,
    ) -> EventEnvelope {
        EventEnvelope::new(&self.inner.service_name, event_type, payload, destination)
    }

    fn publish<'a>(
        &'a self,
        topic: &'a str,
        envelope: &'a EventEnvelope,
        key: Option<&'a str>,
    ) -> BusFuture<'a, ()> {
        Box::pin(async move {
            self.dial()?;

            if self.inner.fail_publish.load(Ordering::SeqCst) {
                return Err(BusError::PublishFailed {
                    topic: topic.to_string(),
                    reason: "in-memory bus configured to fail publishes".to_string(),
                });
            }

            let bytes = envelope.to_bytes()?;
            let headers = MessageHeaders::from_envelope(envelope);

            lock(&self.inner.published).push(PublishedRecord {
                topic: topic.to_string(),
                key: key.unwrap_or(envelope.message_id.as_str()).to_string(),
                envelope: envelope.clone(),
                headers: headers.clone(),
            });

            self.fan_out(topic, Some(&bytes), &headers);
            Ok(())
        })
    }

    fn subscribe<'a>(
        &'a self,
        topics: &'a [&'a str],
        group_id: &'a str,
        handler: Arc<dyn MessageHandler>,
    ) -> BusFuture<'a, SubscribeOutcome> {
        Box::pin(async move {
            let mut groups = lock(&self.inner.groups);
            if groups.contains_key(group_id) {
                tracing::warn!(group_id = %group_id, "Consumer group already exists");
                return Ok(SubscribeOutcome::AlreadyRegistered);
            }

            let (sender, receiver) = mpsc::unbounded_channel();
            let task = tokio::spawn(consume_loop(
                Arc::clone(&self.inner),
                group_id.to_string(),
                handler,
                receiver,
            ));

            groups.insert(
                group_id.to_string(),
                Group {
                    topics: topics.iter().map(|t| (*t).to_string()).collect(),
                    state: ConsumerGroupState::Running,
                    sender,
                    task,
                },
            );
            drop(groups);

            tracing::info!(group_id = %group_id, topics = ?topics, "Consumer group subscribed");
            Ok(SubscribeOutcome::Registered)
        })
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    fn active_consumers(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.inner.groups).keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)] // Panics: Tests fail loudly on unexpected bus errors
mod tests {
    use super::*;
    use aether_core::HandlerError;
    use serde_json::json;

    fn counter_handler(counter: Arc<AtomicUsize>) -> Arc<dyn MessageHandler> {
        Arc::new(move |_t: String, _e: EventEnvelope, _h: MessageHeaders| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), HandlerError>(())
            }
        })
    }

    #[tokio::test]
    async fn connect_is_idempotent() {
        let bus = InMemoryBus::new("svc");
        bus.connect().await.expect("connect should succeed");
        bus.connect().await.expect("connect should succeed");

        assert!(bus.is_connected());
        assert_eq!(bus.connect_calls(), 1);
    }

    #[tokio::test]
    async fn publish_connects_lazily_and_records_key() {
        let bus = InMemoryBus::new("svc");
        let envelope = bus.create_envelope("PING", json!({}), Some("other"));

        bus.publish("t", &envelope, None).await.expect("publish should succeed");

        assert!(bus.is_connected());
        let records = bus.published_to("t");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, envelope.message_id);
        assert_eq!(records[0].envelope.source, "svc");
        assert_eq!(records[0].headers.get("event-type"), Some("PING"));
    }

    #[tokio::test]
    async fn failing_connect_surfaces_connection_error() {
        let bus = InMemoryBus::new("svc");
        bus.fail_connect(true);

        let result = bus.connect().await;

        assert!(matches!(result, Err(BusError::ConnectionFailed(_))));
        assert!(!bus.is_connected());
    }

    #[tokio::test]
    async fn every_group_receives_each_message_once() {
        let bus = InMemoryBus::new("svc");
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        bus.subscribe(&["t"], "a", counter_handler(Arc::clone(&a)))
            .await
            .expect("subscribe should succeed");
        bus.subscribe(&["t", "u"], "b", counter_handler(Arc::clone(&b)))
            .await
            .expect("subscribe should succeed");

        let envelope = bus.create_envelope("PING", json!({}), None);
        bus.publish("t", &envelope, None).await.expect("publish should succeed");
        bus.publish("u", &envelope, None).await.expect("publish should succeed");
        bus.drain().await;

        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn resubscribing_a_group_keeps_its_topics() {
        let bus = InMemoryBus::new("svc");
        let first = bus
            .subscribe(&["t", "u"], "g", counter_handler(Arc::new(AtomicUsize::new(0))))
            .await
            .expect("subscribe should succeed");
        let second = bus
            .subscribe(&["v"], "g", counter_handler(Arc::new(AtomicUsize::new(0))))
            .await
            .expect("subscribe should succeed");

        assert_eq!(first, SubscribeOutcome::Registered);
        assert_eq!(second, SubscribeOutcome::AlreadyRegistered);
        assert_eq!(
            bus.group_topics("g"),
            Some(vec!["t".to_string(), "u".to_string()])
        );
        assert_eq!(bus.group_topics("missing"), None);
    }

    #[tokio::test]
    async fn disconnect_tears_down_groups_and_is_repeatable() {
        let bus = InMemoryBus::new("svc");
        bus.connect().await.expect("connect should succeed");
        bus.subscribe(&["t"], "g", counter_handler(Arc::new(AtomicUsize::new(0))))
            .await
            .expect("subscribe should succeed");
        assert_eq!(bus.group_state("g"), Some(ConsumerGroupState::Running));

        bus.disconnect().await;
        bus.disconnect().await;

        assert!(!bus.is_connected());
        assert!(bus.active_consumers().is_empty());
    }
}
