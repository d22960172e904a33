//! Event envelope exchanged on the message bus.
//!
//! Every message the gateway publishes or consumes is an [`EventEnvelope`]: a flat
//! JSON record carrying identity, routing and tracing fields around an arbitrary
//! payload. The same shape is produced by the backend workers, so decoding is
//! deliberately lenient about the optional parts.
//!
//! # Wire Format
//!
//! ```json
//! {
//!   "messageId": "0b7f0c1e-2d5e-4f0a-9a43-6f1b1c2d3e4f",
//!   "timestamp": "2025-01-01T00:00:00.000Z",
//!   "source": "node-api-service",
//!   "destination": "python-ai-service",
//!   "eventType": "USER_PROMPT_CREATE",
//!   "version": "1.0",
//!   "payload": { "user_prompt": "hello" },
//!   "metadata": { "correlationId": "...", "retryCount": 0, "priority": "normal" }
//! }
//! ```
//!
//! # Example
//!
//! ```
//! use aether_core::envelope::EventEnvelope;
//! use serde_json::json;
//!
//! let envelope = EventEnvelope::new(
//!     "node-api-service",
//!     "USER_PROMPT_CREATE",
//!     json!({ "user_prompt": "hello" }),
//!     Some("python-ai-service"),
//! );
//!
//! assert!(envelope.correlation_id().is_some());
//! assert_eq!(envelope.version, "1.0");
//! ```

use crate::bus::BusError;
use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use uuid::Uuid;

/// Schema version stamped on every envelope created by this gateway.
pub const SCHEMA_VERSION: &str = "1.0";

/// Opaque identifier linking a request envelope to its response envelope.
///
/// Generated ids are UUID v4 strings. Ids received from the bus are kept verbatim,
/// since the backend may use any string format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Create a fresh random correlation ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an existing identifier.
    #[must_use]
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `true` when the identifier carries no characters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for CorrelationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Advisory delivery priority. Carried on the wire, not enforced anywhere.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Low priority
    Low,
    /// Default priority
    #[default]
    Normal,
    /// High priority
    High,
    /// Any value this gateway does not know; decoded instead of rejected.
    #[serde(other)]
    Unknown,
}

/// Envelope metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Metadata {
    /// Links a request to its response. Always present on envelopes built here.
    pub correlation_id: Option<CorrelationId>,
    /// Advisory retry counter (no retry policy reads it).
    #[serde(deserialize_with = "lenient_count")]
    pub retry_count: u32,
    /// Advisory priority.
    #[serde(deserialize_with = "null_as_default")]
    pub priority: Priority,
}

impl Metadata {
    /// Metadata for a freshly created envelope: new correlation id, no retries,
    /// normal priority.
    #[must_use]
    pub fn fresh() -> Self {
        Self {
            correlation_id: Some(CorrelationId::new()),
            retry_count: 0,
            priority: Priority::Normal,
        }
    }
}

/// The unit exchanged on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// Globally unique message identifier, never reused.
    pub message_id: String,
    /// Creation time, ISO-8601.
    pub timestamp: String,
    /// Logical name of the producing service.
    #[serde(default, deserialize_with = "null_as_default")]
    pub source: String,
    /// Logical name of the intended consumer; `None` means broadcast.
    #[serde(default)]
    pub destination: Option<String>,
    /// Semantic event tag (e.g. `USER_PROMPT_CREATE`).
    pub event_type: String,
    /// Schema version.
    #[serde(default = "default_version", deserialize_with = "version_or_default")]
    pub version: String,
    /// Event data; its shape depends on `event_type`.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Correlation and advisory fields.
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: Metadata,
}

fn default_version() -> String {
    SCHEMA_VERSION.to_string()
}

/// Treat an explicit `null` like a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn version_or_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_version))
}

/// Accept any JSON value as a retry count; negative, fractional and non-numeric
/// values read as zero and overflow saturates.
fn lenient_count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value
        .as_u64()
        .map_or(0, |count| u32::try_from(count).unwrap_or(u32::MAX)))
}

impl EventEnvelope {
    /// Build an envelope with a fresh message id, fresh correlation id, the current
    /// timestamp and default metadata.
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
        destination: Option<&str>,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            source: source.into(),
            destination: destination.map(str::to_string),
            event_type: event_type.into(),
            version: SCHEMA_VERSION.to_string(),
            payload,
            metadata: Metadata::fresh(),
        }
    }

    /// Build a response envelope answering `request`.
    ///
    /// The response carries a new message id but copies the request's correlation
    /// id, and is addressed back to the request's source.
    #[must_use]
    pub fn reply_to(
        request: &Self,
        source: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        let mut response = Self::new(source, event_type, payload, Some(&request.source));
        response.metadata.correlation_id = request.metadata.correlation_id.clone();
        response
    }

    /// Replace the correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<CorrelationId>) -> Self {
        self.metadata.correlation_id = Some(correlation_id.into());
        self
    }

    /// The correlation id, if present and non-empty.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        self.metadata
            .correlation_id
            .as_ref()
            .filter(|id| !id.is_empty())
    }

    /// Deserialize the payload into a concrete type.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::MalformedMessage`] if the payload does not match `T`.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, BusError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            BusError::MalformedMessage(format!(
                "payload of {} does not match the expected shape: {e}",
                self.event_type
            ))
        })
    }

    /// Serialize to the JSON wire format.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Serialization`] if the payload cannot be encoded.
    pub fn to_bytes(&self) -> Result<Vec<u8>, BusError> {
        serde_json::to_vec(self).map_err(|e| BusError::Serialization(e.to_string()))
    }

    /// Decode a raw bus payload.
    ///
    /// # Errors
    ///
    /// - [`BusError::EmptyMessage`] if there is no payload or it is empty
    /// - [`BusError::MalformedMessage`] if it is not a JSON envelope
    pub fn decode(bytes: Option<&[u8]>) -> Result<Self, BusError> {
        match bytes {
            None | Some([]) => Err(BusError::EmptyMessage),
            Some(bytes) => serde_json::from_slice(bytes)
                .map_err(|e| BusError::MalformedMessage(e.to_string())),
        }
    }
}

impl fmt::Display for EventEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EventEnvelope {{ type: {}, id: {}, correlation: {} }}",
            self.event_type,
            self.message_id,
            self.correlation_id().map_or("-", CorrelationId::as_str)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_envelope_has_fresh_identity() {
        let a = EventEnvelope::new("svc", "A", json!({}), None);
        let b = EventEnvelope::new("svc", "A", json!({}), None);

        assert_ne!(a.message_id, b.message_id);
        assert_ne!(a.correlation_id(), b.correlation_id());
        assert_eq!(a.metadata.retry_count, 0);
        assert_eq!(a.metadata.priority, Priority::Normal);
        assert!(a.destination.is_none());
        assert!(a.timestamp.ends_with('Z'));
    }

    #[test]
    #[allow(clippy::expect_used)] // Panics: Test will fail if serialization fails
    fn wire_format_uses_camel_case() {
        let envelope = EventEnvelope::new("svc", "USER_PROMPT_CREATE", json!({"k": 1}), Some("ai"));
        let value = serde_json::to_value(&envelope).expect("envelope should serialize");

        assert!(value.get("messageId").is_some());
        assert_eq!(value["eventType"], "USER_PROMPT_CREATE");
        assert_eq!(value["destination"], "ai");
        assert_eq!(value["metadata"]["priority"], "normal");
        assert_eq!(value["metadata"]["retryCount"], 0);
        assert!(value["metadata"]["correlationId"].is_string());
    }

    #[test]
    fn decode_rejects_empty_and_garbage() {
        assert!(matches!(EventEnvelope::decode(None), Err(BusError::EmptyMessage)));
        assert!(matches!(EventEnvelope::decode(Some(b"")), Err(BusError::EmptyMessage)));
        assert!(matches!(
            EventEnvelope::decode(Some(b"not json")),
            Err(BusError::MalformedMessage(_))
        ));
        assert!(matches!(
            EventEnvelope::decode(Some(b"{\"payload\": 1}")),
            Err(BusError::MalformedMessage(_))
        ));
    }

    #[test]
    #[allow(clippy::expect_used)] // Panics: Test will fail if decoding fails
    fn decode_is_lenient_about_optional_fields() {
        let raw = br#"{
            "messageId": "m-1",
            "timestamp": "2025-06-17T08:00:00.123456Z",
            "eventType": "LLM_RESPONSE",
            "payload": {"response": "hi"}
        }"#;

        let envelope = EventEnvelope::decode(Some(raw)).expect("envelope should decode");
        assert_eq!(envelope.version, SCHEMA_VERSION);
        assert!(envelope.correlation_id().is_none());
        assert_eq!(envelope.payload["response"], "hi");
    }

    #[test]
    #[allow(clippy::expect_used)] // Panics: Test will fail if decoding fails
    fn decode_treats_null_fields_as_absent() {
        let raw = br#"{
            "messageId": "m-2",
            "timestamp": "2025-06-17T08:00:00Z",
            "source": null,
            "destination": null,
            "eventType": "LLM_RESPONSE",
            "version": null,
            "payload": {"response": "hi"},
            "metadata": {"correlationId": "abc", "retryCount": null, "priority": null}
        }"#;

        let envelope = EventEnvelope::decode(Some(raw)).expect("envelope should decode");
        assert_eq!(envelope.source, "");
        assert_eq!(envelope.version, SCHEMA_VERSION);
        assert_eq!(envelope.correlation_id(), Some(&CorrelationId::from("abc")));
        assert_eq!(envelope.metadata.retry_count, 0);
        assert_eq!(envelope.metadata.priority, Priority::Normal);
    }

    #[test]
    #[allow(clippy::expect_used)] // Panics: Test will fail if decoding fails
    fn decode_accepts_null_metadata() {
        let raw = br#"{
            "messageId": "m-3",
            "timestamp": "2025-06-17T08:00:00Z",
            "eventType": "LLM_RESPONSE",
            "payload": {},
            "metadata": null
        }"#;

        let envelope = EventEnvelope::decode(Some(raw)).expect("envelope should decode");
        assert_eq!(envelope.metadata, Metadata::default());
        assert!(envelope.correlation_id().is_none());
    }

    #[test]
    #[allow(clippy::expect_used)] // Panics: Test will fail if decoding fails
    fn decode_does_not_enforce_advisory_fields() {
        let decode = |metadata: &str| {
            let raw = format!(
                r#"{{"messageId":"m","timestamp":"t","eventType":"E","payload":{{}},"metadata":{metadata}}}"#
            );
            EventEnvelope::decode(Some(raw.as_bytes())).expect("envelope should decode")
        };

        let urgent = decode(r#"{"correlationId":"abc","priority":"urgent","retryCount":-1}"#);
        assert_eq!(urgent.metadata.priority, Priority::Unknown);
        assert_eq!(urgent.metadata.retry_count, 0);
        assert_eq!(urgent.correlation_id(), Some(&CorrelationId::from("abc")));

        let huge = decode(r#"{"retryCount":99999999999,"priority":"high"}"#);
        assert_eq!(huge.metadata.retry_count, u32::MAX);
        assert_eq!(huge.metadata.priority, Priority::High);

        assert_eq!(decode(r#"{"retryCount":"3"}"#).metadata.retry_count, 0);
    }

    #[test]
    #[allow(clippy::expect_used)] // Panics: Test will fail if the payload does not match
    fn payload_as_reads_typed_payloads() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Answer {
            response: String,
            model: Option<String>,
        }

        let envelope = EventEnvelope::new("ai", "LLM_RESPONSE", json!({"response": "hi"}), None);
        let answer: Answer = envelope.payload_as().expect("payload should match");
        assert_eq!(
            answer,
            Answer {
                response: "hi".to_string(),
                model: None,
            }
        );

        let mismatch = EventEnvelope::new("ai", "LLM_RESPONSE", json!({"response": 1}), None)
            .payload_as::<Answer>();
        assert!(matches!(mismatch, Err(BusError::MalformedMessage(msg)) if msg.contains("LLM_RESPONSE")));
    }

    #[test]
    fn empty_correlation_id_counts_as_absent() {
        let envelope = EventEnvelope::new("svc", "A", json!(null), None).with_correlation_id("  ");
        assert!(envelope.correlation_id().is_none());
    }

    #[test]
    fn reply_copies_correlation_id() {
        let request = EventEnvelope::new("gateway", "PROMPT", json!({}), Some("worker"));
        let response = EventEnvelope::reply_to(&request, "worker", "PROMPT_DONE", json!({}));

        assert_eq!(response.correlation_id(), request.correlation_id());
        assert_ne!(response.message_id, request.message_id);
        assert_eq!(response.destination.as_deref(), Some("gateway"));
    }

    #[test]
    fn envelope_display() {
        let envelope = EventEnvelope::new("svc", "PROMPT", json!(null), None).with_correlation_id("abc");
        let display = format!("{envelope}");
        assert!(display.contains("PROMPT"));
        assert!(display.contains("abc"));
    }
}
