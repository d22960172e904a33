//! Graceful shutdown coordination.
//!
//! `main` stops the HTTP server first (no new calls), then runs the
//! [`ShutdownCoordinator`], whose handlers release the bus: the producer is flushed
//! and every consume loop is stopped.
//!
//! ```ignore
//! let mut coordinator = ShutdownCoordinator::new(Duration::from_secs(30));
//! coordinator.register(Arc::new(BusShutdownHandler::new(bus.clone())));
//!
//! axum::serve(listener, app).with_graceful_shutdown(wait_for_signal()).await?;
//! coordinator.shutdown().await?;
//! ```

use aether_core::MessageBus;
use aether_runtime::RequestBridge;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// A component that must be released before the process exits.
#[async_trait]
pub trait ShutdownHandler: Send + Sync {
    /// Component name for logging.
    fn name(&self) -> &str;

    /// Release the component.
    ///
    /// # Errors
    ///
    /// Returns a description of what could not be released.
    async fn shutdown(&self) -> Result<(), String>;
}

/// Runs every registered handler with a shared time limit.
pub struct ShutdownCoordinator {
    handlers: Vec<Arc<dyn ShutdownHandler>>,
    timeout_duration: Duration,
}

impl ShutdownCoordinator {
    /// Create a coordinator that gives each handler at most `timeout`.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self {
            handlers: Vec::new(),
            timeout_duration: timeout,
        }
    }

    /// Register a handler. Handlers run concurrently.
    pub fn register(&mut self, handler: Arc<dyn ShutdownHandler>) {
        info!(component = handler.name(), "Registered shutdown handler");
        self.handlers.push(handler);
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Run all handlers and collect failures.
    ///
    /// # Errors
    ///
    /// Returns one message per handler that failed or timed out.
    pub async fn shutdown(&self) -> Result<(), Vec<String>> {
        info!(
            components = self.handlers.len(),
            timeout = ?self.timeout_duration,
            "Initiating graceful shutdown"
        );

        let shutdowns = self.handlers.iter().map(|handler| async move {
            let name = handler.name();
            match tokio::time::timeout(self.timeout_duration, handler.shutdown()).await {
                Ok(Ok(())) => {
                    info!(component = name, "Component shut down");
                    Ok(())
                },
                Ok(Err(e)) => {
                    error!(component = name, error = %e, "Component shutdown failed");
                    Err(format!("{name}: {e}"))
                },
                Err(_) => {
                    error!(component = name, "Component shutdown timed out");
                    Err(format!("{name}: timeout after {:?}", self.timeout_duration))
                },
            }
        });

        let errors: Vec<String> = futures::future::join_all(shutdowns)
            .await
            .into_iter()
            .filter_map(Result::err)
            .collect();

        if errors.is_empty() {
            info!("All components shut down");
            Ok(())
        } else {
            error!(failures = errors.len(), "Shutdown completed with errors");
            Err(errors)
        }
    }
}

/// Disconnects the message bus.
pub struct BusShutdownHandler {
    bus: Arc<dyn MessageBus>,
}

impl BusShutdownHandler {
    /// Wrap the bus to release on shutdown.
    #[must_use]
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl ShutdownHandler for BusShutdownHandler {
    fn name(&self) -> &str {
        "message-bus"
    }

    async fn shutdown(&self) -> Result<(), String> {
        self.bus.disconnect().await;
        if self.bus.is_connected() {
            Err("bus still reports connected after disconnect".to_string())
        } else {
            Ok(())
        }
    }
}

/// Reports calls still waiting when the server stopped; their callers are gone.
pub struct PendingCallsShutdownHandler {
    bridge: Arc<RequestBridge>,
}

impl PendingCallsShutdownHandler {
    /// Watch `bridge` for abandoned calls.
    #[must_use]
    pub fn new(bridge: Arc<RequestBridge>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl ShutdownHandler for PendingCallsShutdownHandler {
    fn name(&self) -> &str {
        "request-bridge"
    }

    async fn shutdown(&self) -> Result<(), String> {
        let pending = self.bridge.pending_count();
        if pending > 0 {
            warn!(pending, "Calls still pending at shutdown");
        }
        Ok(())
    }
}

/// Resolve on Ctrl+C or SIGTERM.
pub async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
            },
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable, waiting for Ctrl+C only");
                wait_for_ctrl_c().await;
            },
        }
    }

    #[cfg(not(unix))]
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use aether_testing::InMemoryBus;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct MockShutdownHandler {
        name: String,
        should_fail: bool,
        shutdown_called: Arc<AtomicBool>,
    }

    impl MockShutdownHandler {
        fn new(name: impl Into<String>, should_fail: bool) -> Self {
            Self {
                name: name.into(),
                should_fail,
                shutdown_called: Arc::new(AtomicBool::new(false)),
            }
        }

        fn was_called(&self) -> bool {
            self.shutdown_called.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ShutdownHandler for MockShutdownHandler {
        fn name(&self) -> &str {
            &self.name
        }

        async fn shutdown(&self) -> Result<(), String> {
            self.shutdown_called.store(true, Ordering::SeqCst);
            if self.should_fail {
                Err("Simulated failure".to_string())
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_coordinator_runs_every_handler() {
        let ok = Arc::new(MockShutdownHandler::new("ok", false));
        let failing = Arc::new(MockShutdownHandler::new("failing", true));

        let mut coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
        coordinator.register(Arc::clone(&ok) as Arc<dyn ShutdownHandler>);
        coordinator.register(Arc::clone(&failing) as Arc<dyn ShutdownHandler>);
        assert_eq!(coordinator.handler_count(), 2);

        let errors = coordinator.shutdown().await.expect_err("one handler fails");

        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("failing"));
        assert!(ok.was_called());
        assert!(failing.was_called());
    }

    #[tokio::test]
    async fn test_coordinator_timeout() {
        struct SlowShutdownHandler;

        #[async_trait]
        impl ShutdownHandler for SlowShutdownHandler {
            fn name(&self) -> &str {
                "slow"
            }

            async fn shutdown(&self) -> Result<(), String> {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            }
        }

        let mut coordinator = ShutdownCoordinator::new(Duration::from_millis(100));
        coordinator.register(Arc::new(SlowShutdownHandler));

        let errors = coordinator.shutdown().await.expect_err("handler is too slow");
        assert!(errors[0].contains("timeout"));
    }

    #[tokio::test]
    async fn test_bus_handler_disconnects() {
        let bus = InMemoryBus::new("gateway");
        bus.connect().await.expect("in-memory connect");

        let handler = BusShutdownHandler::new(Arc::new(bus.clone()));
        handler.shutdown().await.expect("disconnect should succeed");

        assert!(!bus.is_connected());
    }
}
