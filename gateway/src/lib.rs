//! Aether gateway: wiring and lifecycle for the HTTP to message bus bridge.
//!
//! The binary in `main.rs` is a thin shell over this library:
//!
//! 1. [`GatewayConfig::from_env`] loads and validates settings
//! 2. [`build_bus`] creates the Redpanda client
//! 3. [`start`] connects, builds the bridge and subscribes its dispatcher
//! 4. the axum server runs until a signal arrives
//! 5. the [`ShutdownCoordinator`] releases the bus

pub mod config;
pub mod shutdown;

pub use config::{BridgeConfig, ConfigError, GatewayConfig, KafkaConfig, ServerConfig};
pub use shutdown::{
    BusShutdownHandler, PendingCallsShutdownHandler, ShutdownCoordinator, ShutdownHandler,
    wait_for_signal,
};

use aether_core::{BusError, MessageBus};
use aether_redpanda::RedpandaBusClient;
use aether_runtime::RequestBridge;
use aether_web::handlers::PROMPT_EVENT_TYPE;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the `fmt` subscriber filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Create the Redpanda bus client described by `config`.
///
/// # Errors
///
/// Returns [`BusError::ConnectionFailed`] when the broker list is unusable.
pub fn build_bus(config: &GatewayConfig) -> Result<RedpandaBusClient, BusError> {
    let kafka = &config.kafka;
    RedpandaBusClient::builder()
        .brokers(kafka.brokers.join(","))
        .client_id(&kafka.client_id)
        .service_name(&kafka.service_name)
        .auto_offset_reset(&kafka.auto_offset_reset)
        .session_timeout(kafka.session_timeout)
        .heartbeat_interval(kafka.heartbeat_interval)
        .security(kafka.security.clone())
        .build()
}

/// Bridge with the prompt route, destination and timeout from `config`.
#[must_use]
pub fn build_bridge(bus: Arc<dyn MessageBus>, config: &GatewayConfig) -> RequestBridge {
    RequestBridge::builder(bus)
        .route(PROMPT_EVENT_TYPE, &config.kafka.prompt_topic)
        .destination(&config.bridge.destination)
        .default_timeout(config.bridge.timeout)
        .build()
}

/// Connect the bus, build the bridge and subscribe its dispatcher to the response topics.
///
/// # Errors
///
/// Returns the bus error if connecting or subscribing fails. The bus is
/// disconnected again when the subscription fails.
pub async fn start(
    bus: Arc<dyn MessageBus>,
    config: &GatewayConfig,
) -> Result<Arc<RequestBridge>, BusError> {
    bus.connect().await?;

    let bridge = Arc::new(build_bridge(Arc::clone(&bus), config));
    let topics: Vec<&str> = config.kafka.response_topics.iter().map(String::as_str).collect();

    if let Err(error) = bus
        .subscribe(&topics, &config.kafka.group_id, Arc::new(bridge.dispatcher()))
        .await
    {
        bus.disconnect().await;
        return Err(error);
    }

    tracing::info!(
        prompt_topic = %config.kafka.prompt_topic,
        response_topics = ?topics,
        group_id = %config.kafka.group_id,
        "Gateway listening for responses"
    );
    Ok(bridge)
}
