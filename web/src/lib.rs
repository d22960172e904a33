//! HTTP surface of the Aether gateway.
//!
//! A thin axum layer over [`RequestBridge`](aether_runtime::RequestBridge): handlers
//! validate input, issue one bridged call, and map the outcome to a status code.
//!
//! # Request Flow
//!
//! 1. **Request id** assigned by [`middleware::request_id_layer`]
//! 2. **Body validated** by [`extractors::ValidatedJson`] (422 on failure)
//! 3. **Bridged call** published on the bus; the handler waits for the correlated response
//! 4. **Outcome mapped** by [`AppError`] (504 timeout, 503 publish failure, 502 remote failure)
//!
//! # Example
//!
//! ```ignore
//! let state = AppState::new(bridge).with_metrics(handle);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, aether_web::router(state)).await?;
//! ```

#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod router;
pub mod state;

pub use error::AppError;
pub use extractors::{RequestId, Validate, ValidatedJson};
pub use middleware::{REQUEST_ID_HEADER, request_id_layer};
pub use response::ApiResponse;
pub use router::router;
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
