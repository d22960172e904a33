//! Aether gateway HTTP server.

use aether_core::MessageBus;
use aether_gateway::{
    BusShutdownHandler, GatewayConfig, PendingCallsShutdownHandler, ShutdownCoordinator,
    build_bus, init_tracing, start, wait_for_signal,
};
use aether_runtime::metrics::install_prometheus_recorder;
use aether_web::{AppState, router};
use anyhow::Context;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();
    init_tracing();
    match dotenv {
        Ok(path) => info!(path = %path.display(), "Loaded .env"),
        Err(e) => info!(reason = %e, "No .env loaded"),
    }

    let config = GatewayConfig::from_env().context("Failed to load configuration")?;
    info!(
        brokers = ?config.kafka.brokers,
        service_name = %config.kafka.service_name,
        address = %config.server.address(),
        "Configuration loaded"
    );

    let metrics = install_prometheus_recorder().context("Failed to install metrics recorder")?;

    let bus: Arc<dyn MessageBus> =
        Arc::new(build_bus(&config).context("Failed to create bus client")?);
    let bridge = start(Arc::clone(&bus), &config)
        .await
        .context("Failed to connect to the message bus")?;

    let mut coordinator = ShutdownCoordinator::new(config.server.shutdown_timeout);
    coordinator.register(Arc::new(PendingCallsShutdownHandler::new(Arc::clone(&bridge))));
    coordinator.register(Arc::new(BusShutdownHandler::new(Arc::clone(&bus))));

    let app = router(AppState::new(bridge).with_metrics(metrics));
    let address = config.server.address();
    let served = async {
        let listener = tokio::net::TcpListener::bind(&address)
            .await
            .with_context(|| format!("Failed to bind {address}"))?;
        info!(address = %address, "Server listening");
        axum::serve(listener, app)
            .with_graceful_shutdown(wait_for_signal())
            .await
            .context("HTTP server failed")
    }
    .await;

    info!("Server stopped");
    if let Err(errors) = coordinator.shutdown().await {
        error!(?errors, "Shutdown incomplete");
    }

    served
}
