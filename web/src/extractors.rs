//! Custom Axum extractors.
//!
//! - [`RequestId`]: the id assigned by [`request_id_layer`](crate::middleware::request_id_layer)
//! - [`ValidatedJson`]: a JSON body that also passes [`Validate`]
//!
//! Both reject with [`AppError`] so malformed input gets the same `{code, message}`
//! body as every other failure.

use crate::error::AppError;
use crate::middleware::{REQUEST_ID_HEADER, accepted_request_id};
use axum::{
    Json, async_trait,
    extract::{FromRequest, FromRequestParts, Request, rejection::JsonRejection},
    http::request::Parts,
};
use serde::de::DeserializeOwned;
use uuid::Uuid;

/// Id of the current HTTP request.
///
/// Read from request extensions when the middleware is installed; otherwise taken
/// from the `X-Request-ID` header or generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = parts.extensions.get::<Self>() {
            return Ok(id.clone());
        }
        let id = accepted_request_id(parts.headers.get(REQUEST_ID_HEADER))
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Ok(Self(id))
    }
}

/// Request bodies that check their own invariants after deserialization.
pub trait Validate {
    /// Return a user-facing message describing the first violation.
    ///
    /// # Errors
    ///
    /// Returns the violation message when the value is not acceptable.
    fn validate(&self) -> Result<(), String>;
}

/// JSON body extractor that rejects with 422 on parse or validation failure.
#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| {
                tracing::info!(error = %rejection.body_text(), "Rejected request body");
                AppError::validation(rejection.body_text())
            })?;

        value.validate().map_err(|message| {
            tracing::info!(error = %message, "Validation failed");
            AppError::validation(message)
        })?;

        Ok(Self(value))
    }
}
