//! Error types for web handlers.
//!
//! [`AppError`] is the single error type handlers return. It carries the HTTP
//! status, a stable error code for clients, and an optional internal source that
//! is logged but never serialized.

use aether_core::BusError;
use aether_runtime::BridgeError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt;

/// Application error type for web handlers.
///
/// # Examples
///
/// ```ignore
/// async fn handler(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
///     let data = state.bridge.call_default("USER_PROMPT_CREATE", payload).await?;
///     Ok(Json(data))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: String,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: String) -> Self {
        Self {
            status,
            message,
            code,
            source: None,
        }
    }

    /// Attach an internal source error.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// HTTP status of this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Client-facing error code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            message.into(),
            "BAD_REQUEST".to_string(),
        )
    }

    /// Create a 422 Unprocessable Entity error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            message.into(),
            "VALIDATION_ERROR".to_string(),
        )
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message.into(),
            "INTERNAL_SERVER_ERROR".to_string(),
        )
    }

    /// Create a 502 Bad Gateway error.
    #[must_use]
    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_GATEWAY,
            message.into(),
            "BAD_GATEWAY".to_string(),
        )
    }

    /// Create a 503 Service Unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            message.into(),
            "SERVICE_UNAVAILABLE".to_string(),
        )
    }

    /// Create a 504 Gateway Timeout error.
    #[must_use]
    pub fn gateway_timeout(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::GATEWAY_TIMEOUT,
            message.into(),
            "GATEWAY_TIMEOUT".to_string(),
        )
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    /// Error code (for client error handling).
    code: String,
    /// Human-readable error message.
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            if let Some(source) = &self.source {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    error = %source,
                    "Request failed"
                );
            } else {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    "Request failed"
                );
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

/// Map bridge failures onto gateway status codes.
///
/// | Failure                         | Status |
/// |---------------------------------|--------|
/// | response timeout                | 504    |
/// | publish / broker unreachable    | 503    |
/// | backend reported an error       | 502    |
/// | no route, duplicate id, closed  | 500    |
impl From<BridgeError> for AppError {
    fn from(err: BridgeError) -> Self {
        let app = match &err {
            BridgeError::ResponseTimeout { .. } => {
                Self::gateway_timeout("Timed out waiting for a response from the backend")
            },
            BridgeError::Publish(BusError::ConnectionFailed(_)) => {
                Self::unavailable("Message bus is unavailable")
            },
            BridgeError::Publish(_) => Self::unavailable("Failed to submit the request"),
            BridgeError::Remote(failure) => Self::bad_gateway(failure.message.clone()),
            BridgeError::NoRoute(_)
            | BridgeError::DuplicateCorrelation(_)
            | BridgeError::Closed(_) => Self::internal("An internal error occurred"),
        };
        app.with_source(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aether_core::CorrelationId;
    use aether_runtime::RemoteFailure;
    use std::time::Duration;

    #[test]
    fn test_error_display() {
        let err = AppError::bad_request("Invalid input");
        assert_eq!(err.to_string(), "[BAD_REQUEST] Invalid input");
    }

    #[test]
    fn test_validation() {
        let err = AppError::validation("prompt is required");
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_bridge_timeout_is_gateway_timeout() {
        let err = AppError::from(BridgeError::ResponseTimeout {
            correlation_id: CorrelationId::from("abc"),
            timeout: Duration::from_secs(30),
        });
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_bridge_publish_is_unavailable() {
        let err = AppError::from(BridgeError::Publish(BusError::PublishFailed {
            topic: "user.prompt".to_string(),
            reason: "broker down".to_string(),
        }));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);

        let err = AppError::from(BridgeError::Publish(BusError::ConnectionFailed(
            "refused".to_string(),
        )));
        assert_eq!(err.code(), "SERVICE_UNAVAILABLE");
    }

    #[test]
    fn test_bridge_remote_is_bad_gateway() {
        let err = AppError::from(BridgeError::Remote(RemoteFailure {
            event_type: "LLM_ERROR".to_string(),
            message: "model overloaded".to_string(),
        }));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.to_string(), "[BAD_GATEWAY] model overloaded");
    }

    #[test]
    fn test_bridge_internal_failures() {
        for err in [
            BridgeError::NoRoute("UNKNOWN".to_string()),
            BridgeError::DuplicateCorrelation(CorrelationId::from("abc")),
            BridgeError::Closed(CorrelationId::from("abc")),
        ] {
            assert_eq!(AppError::from(err).status(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }
}
