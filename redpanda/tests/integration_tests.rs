//! Integration tests for [`RedpandaBusClient`] against a real Kafka broker.
//!
//! These tests use testcontainers to spin up Kafka and validate:
//! - Connect, publish and subscribe round-trip with headers
//! - Idempotent consumer group registration
//! - Malformed messages do not stop the consume loop
//! - A full bridged call answered by a scripted worker
//!
//! # Running These Tests
//!
//! These tests are marked as `#[ignore]` by default because they require Docker
//! and take 15-60 seconds each to start Kafka.
//!
//! ```bash
//! cargo test -p aether-redpanda --test integration_tests -- --ignored
//! ```

#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use aether_core::{
    EventEnvelope, HandlerError, MessageBus, MessageHandler, MessageHeaders, SubscribeOutcome,
};
use aether_redpanda::RedpandaBusClient;
use aether_runtime::{PayloadExtractor, RequestBridge, RetryPolicy};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::kafka::{KAFKA_PORT, Kafka};
use tokio::sync::mpsc;

async fn start_kafka() -> (ContainerAsync<Kafka>, String) {
    let kafka = Kafka::default()
        .with_env_var("KAFKA_AUTO_CREATE_TOPICS_ENABLE", "true")
        .start()
        .await
        .expect("Failed to start Kafka container");

    let host = kafka.get_host().await.expect("Failed to get host");
    let port = kafka
        .get_host_port_ipv4(KAFKA_PORT)
        .await
        .expect("Failed to get port");
    (kafka, format!("{host}:{port}"))
}

fn client(brokers: &str, service_name: &str) -> RedpandaBusClient {
    RedpandaBusClient::builder()
        .brokers(brokers)
        .client_id(format!("{service_name}-client"))
        .service_name(service_name)
        .auto_offset_reset("earliest")
        .retry_policy(RetryPolicy::builder().max_retries(20).build())
        .build()
        .expect("Failed to create bus client")
}

/// Publish until the topic exists and metadata has propagated.
async fn ensure_topic_exists(bus: &RedpandaBusClient, topic: &str) {
    let warmup = bus.create_envelope("WARMUP", json!({}), None);
    for attempt in 1..=30 {
        if bus.publish(topic, &warmup, None).await.is_ok() {
            tokio::time::sleep(Duration::from_secs(3)).await;
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(attempt != 30, "Failed to create topic {topic}");
    }
}

fn forwarding_handler(
    tx: mpsc::UnboundedSender<(EventEnvelope, MessageHeaders)>,
) -> Arc<dyn MessageHandler> {
    Arc::new(move |_topic: String, envelope: EventEnvelope, headers: MessageHeaders| {
        let tx = tx.clone();
        async move {
            if envelope.event_type != "WARMUP" {
                let _ = tx.send((envelope, headers));
            }
            Ok::<(), HandlerError>(())
        }
    })
}

#[tokio::test]
#[ignore]
async fn test_publish_and_subscribe_round_trip() {
    let (_kafka, brokers) = start_kafka().await;
    let bus = client(&brokers, "gateway");
    bus.connect().await.expect("Failed to connect");
    bus.connect().await.expect("Second connect should be a no-op");
    ensure_topic_exists(&bus, "round-trip").await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let outcome = bus
        .subscribe(&["round-trip"], "round-trip-group", forwarding_handler(tx.clone()))
        .await
        .expect("Failed to subscribe");
    assert_eq!(outcome, SubscribeOutcome::Registered);

    let again = bus
        .subscribe(&["round-trip"], "round-trip-group", forwarding_handler(tx))
        .await
        .expect("Duplicate subscribe should not fail");
    assert_eq!(again, SubscribeOutcome::AlreadyRegistered);

    let envelope = bus.create_envelope("PING", json!({"n": 1}), Some("worker"));
    bus.publish("round-trip", &envelope, None)
        .await
        .expect("Failed to publish");

    let (received, headers) = tokio::time::timeout(Duration::from_secs(30), rx.recv())
        .await
        .expect("Timed out waiting for message")
        .expect("Channel closed");

    assert_eq!(received.message_id, envelope.message_id);
    assert_eq!(received.correlation_id(), envelope.correlation_id());
    assert_eq!(headers.get("event-type"), Some("PING"));
    assert_eq!(headers.get("source"), Some("gateway"));

    // Exactly one delivery despite the duplicate subscribe.
    let extra = tokio::time::timeout(Duration::from_secs(3), rx.recv()).await;
    assert!(extra.is_err(), "message delivered more than once");

    bus.disconnect().await;
    assert!(!bus.is_connected());
    assert!(bus.active_consumers().is_empty());
}

#[tokio::test]
#[ignore]
async fn test_malformed_message_does_not_stop_consumer() {
    let (_kafka, brokers) = start_kafka().await;
    let bus = client(&brokers, "gateway");
    ensure_topic_exists(&bus, "poison").await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    bus.subscribe(&["poison"], "poison-group", forwarding_handler(tx))
        .await
        .expect("Failed to subscribe");

    let raw: FutureProducer = ClientConfig::new()
        .set("bootstrap.servers", &brokers)
        .create()
        .expect("Failed to create raw producer");
    raw.send(
        FutureRecord::<str, str>::to("poison").payload("definitely not json"),
        Timeout::After(Duration::from_secs(5)),
    )
    .await
    .expect("Failed to send raw message");

    let valid = bus.create_envelope("AFTER_POISON", json!({}), None);
    bus.publish("poison", &valid, None)
        .await
        .expect("Failed to publish");

    let (received, _) = tokio::time::timeout(Duration::from_secs(30), rx.recv())
        .await
        .expect("Consumer stalled after malformed message")
        .expect("Channel closed");
    assert_eq!(received.event_type, "AFTER_POISON");

    bus.disconnect().await;
}

#[tokio::test]
#[ignore]
async fn test_bridged_call_over_kafka() {
    let (_kafka, brokers) = start_kafka().await;
    let gateway = Arc::new(client(&brokers, "gateway"));
    let worker = Arc::new(client(&brokers, "python-ai-service"));
    gateway.connect().await.expect("Failed to connect gateway");
    ensure_topic_exists(&gateway, "requests").await;
    ensure_topic_exists(&gateway, "responses").await;

    let replier = Arc::clone(&worker);
    worker
        .subscribe(
            &["requests"],
            "worker-group",
            Arc::new(move |_t: String, request: EventEnvelope, _h: MessageHeaders| {
                let replier = Arc::clone(&replier);
                async move {
                    if request.event_type == "WARMUP" {
                        return Ok::<(), HandlerError>(());
                    }
                    let response = EventEnvelope::reply_to(
                        &request,
                        "python-ai-service",
                        "LLM_RESPONSE",
                        json!({"response": "hi"}),
                    );
                    replier.publish("responses", &response, None).await?;
                    Ok(())
                }
            }),
        )
        .await
        .expect("Failed to subscribe worker");

    let bridge = RequestBridge::builder(gateway.clone())
        .route("prompt", "requests")
        .build();
    gateway
        .subscribe(
            &["responses"],
            "gateway-responses",
            Arc::new(bridge.dispatcher_with(Arc::new(PayloadExtractor))),
        )
        .await
        .expect("Failed to subscribe gateway");

    let result = bridge
        .call("prompt", json!({"prompt": "hello"}), Duration::from_secs(60))
        .await
        .expect("Bridged call failed");

    assert_eq!(result, json!({"response": "hi"}));
    assert_eq!(bridge.pending_count(), 0);

    gateway.disconnect().await;
    worker.disconnect().await;
}
