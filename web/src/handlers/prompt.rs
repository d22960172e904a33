//! Prompt submission.
//!
//! `POST /api/v1/prompt` publishes a `USER_PROMPT_CREATE` request on the bus and
//! holds the HTTP request open until the AI service answers on the response topic
//! (or the call times out).

use crate::WebResult;
use crate::extractors::{RequestId, ValidatedJson, Validate};
use crate::response::ApiResponse;
use crate::state::AppState;
use axum::extract::State;
use serde::Deserialize;
use serde_json::{Value, json};

/// Event type of prompt requests.
pub const PROMPT_EVENT_TYPE: &str = "USER_PROMPT_CREATE";

/// Query type used when the caller names a document but no query type.
const DOCUMENT_QUERY: &str = "specific_document";

/// Query type used when the caller names neither.
const GENERAL_QUERY: &str = "general";

/// Body of `POST /api/v1/prompt`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptRequest {
    /// The user's prompt.
    pub prompt: String,
    /// Document the prompt is about, if any.
    #[serde(default)]
    pub document_id: Option<String>,
    /// Retrieval mode requested by the caller.
    #[serde(default)]
    pub query_type: Option<String>,
}

impl Validate for PromptRequest {
    fn validate(&self) -> Result<(), String> {
        if self.prompt.trim().is_empty() {
            return Err("prompt must not be empty".to_string());
        }
        if self.document_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err("documentId must not be empty".to_string());
        }
        if self.query_type.as_deref().is_some_and(|q| q.trim().is_empty()) {
            return Err("queryType must not be empty".to_string());
        }
        Ok(())
    }
}

impl PromptRequest {
    /// Payload sent to the AI service.
    #[must_use]
    pub fn into_payload(self) -> Value {
        let query_type = self.query_type.unwrap_or_else(|| {
            if self.document_id.is_some() {
                DOCUMENT_QUERY.to_string()
            } else {
                GENERAL_QUERY.to_string()
            }
        });
        json!({
            "user_prompt": self.prompt,
            "document_id": self.document_id,
            "query_type": query_type,
        })
    }
}

/// Submit a prompt and wait for the model's answer.
///
/// # Errors
///
/// - 422 when the body is missing, malformed, or fails validation
/// - 503 when the request could not be published
/// - 504 when no response arrives in time
/// - 502 when the AI service reports a failure
pub async fn submit_prompt(
    State(state): State<AppState>,
    request_id: RequestId,
    ValidatedJson(request): ValidatedJson<PromptRequest>,
) -> WebResult<ApiResponse<Value>> {
    tracing::info!(
        request_id = %request_id.0,
        document_id = ?request.document_id,
        "Submitting prompt"
    );

    let data = state
        .bridge
        .call_default(PROMPT_EVENT_TYPE, request.into_payload())
        .await
        .inspect_err(|error| {
            tracing::warn!(request_id = %request_id.0, error = %error, "Prompt call failed");
        })?;

    Ok(ApiResponse::success(data))
}
