//! # Aether Testing
//!
//! Testing utilities for the Aether gateway.
//!
//! This crate provides:
//! - [`InMemoryBus`]: a [`MessageBus`](aether_core::MessageBus) with production
//!   delivery rules and no broker
//! - [`Responder`]: a scripted backend worker answering requests on the bus
//! - [`init_test_tracing`]: log output captured by the test harness
//!
//! ## Example
//!
//! ```ignore
//! use aether_testing::{InMemoryBus, Reply, Responder};
//!
//! #[tokio::test]
//! async fn prompt_round_trip() {
//!     let bus = InMemoryBus::new("gateway");
//!     Responder::new(bus.clone(), "python-ai-service", "llm.response")
//!         .serve("user.prompt.create", "worker", |_| Reply::respond("LLM_RESPONSE", json!({"response": "hi"})))
//!         .await?;
//!     // ... build a RequestBridge over `bus` and call it
//! }
//! ```

pub mod bus;
pub mod responder;

pub use bus::{InMemoryBus, PublishedRecord};
pub use responder::{Reply, Responder};

/// Install a `fmt` subscriber writing through the test harness.
///
/// Honors `RUST_LOG`. Safe to call from every test; only the first call installs.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}
