//! Success envelope returned by gateway endpoints.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// `{status: "success", message, data?}` body.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ApiResponse<T> {
    /// Always `"success"`.
    pub status: &'static str,
    /// Human-readable summary.
    pub message: String,
    /// Result payload, omitted when there is none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Success body with `data` and the default `"Success"` message.
    #[must_use]
    pub fn success(data: T) -> Self {
        Self::with_message("Success", data)
    }

    /// Success body with a custom message.
    #[must_use]
    pub fn with_message(message: impl Into<String>, data: T) -> Self {
        Self {
            status: "success",
            message: message.into(),
            data: Some(data),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_shape() {
        let body = serde_json::to_value(ApiResponse::success("hi")).expect("serializable");
        assert_eq!(body, json!({"status": "success", "message": "Success", "data": "hi"}));
    }
}
