//! # Aether Runtime
//!
//! Correlation layer for the Aether gateway: turns a fire-and-forget bus into
//! calls that return the backend's answer.
//!
//! ## Core Components
//!
//! - **Correlation Registry** ([`registry`]): pending calls keyed by correlation id,
//!   completed exactly once by resolution or deadline
//! - **Request Bridge** ([`bridge`]): register, publish, then wait
//! - **Inbound Dispatcher** ([`dispatcher`]): bus handler resolving pending calls
//!   from response envelopes
//! - **Retry** ([`retry`]): exponential backoff used by bus clients to connect
//! - **Metrics** ([`metrics`]): Prometheus series for calls and responses
//!
//! ## Example
//!
//! ```ignore
//! use aether_runtime::RequestBridge;
//!
//! let bridge = RequestBridge::builder(bus.clone())
//!     .route("USER_PROMPT_CREATE", "user.prompt.create")
//!     .destination("python-ai-service")
//!     .build();
//!
//! bus.subscribe(&["llm.response"], "gateway-llm-response", Arc::new(bridge.dispatcher()))
//!     .await?;
//!
//! let answer = bridge.call_default("USER_PROMPT_CREATE", json!({"prompt": "hi"})).await?;
//! ```

pub mod bridge;
pub mod dispatcher;
pub mod metrics;
pub mod registry;
pub mod retry;

pub use bridge::{
    BridgeError, CallOutcome, DEFAULT_CALL_TIMEOUT, RemoteFailure, RequestBridge,
    RequestBridgeBuilder,
};
pub use dispatcher::{InboundDispatcher, LlmResponseExtractor, PayloadExtractor, ResponseExtractor};
pub use registry::{CorrelationRegistry, PendingCall, RegistryError};
pub use retry::{RetryPolicy, retry_with_backoff};
