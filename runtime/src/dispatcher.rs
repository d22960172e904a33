//! Inbound dispatcher: routes response envelopes to their pending callers.
//!
//! The dispatcher is the [`MessageHandler`] subscribed to response topics. For each
//! envelope it reads the correlation id, shapes the payload into the result the
//! caller expects and resolves the matching entry in the [`CorrelationRegistry`].
//!
//! It never fails past its boundary: missing correlation ids, unknown ids and
//! extraction problems are logged, and the consume loop moves on.

use crate::bridge::{CallOutcome, RemoteFailure};
use crate::metrics::DispatcherMetrics;
use crate::registry::CorrelationRegistry;
use aether_core::{EventEnvelope, HandlerError, MessageHandler, MessageHeaders};
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Turns a response envelope into the value handed back to the caller.
pub trait ResponseExtractor: Send + Sync {
    /// Shape `envelope.payload` into the call result.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteFailure`] when the backend reported that the call failed.
    fn extract(&self, envelope: &EventEnvelope) -> Result<Value, RemoteFailure>;
}

/// Reports a failure when the payload carries a string `error` field.
fn remote_error(envelope: &EventEnvelope) -> Option<RemoteFailure> {
    envelope
        .payload
        .get("error")
        .and_then(Value::as_str)
        .map(|message| RemoteFailure {
            event_type: envelope.event_type.clone(),
            message: message.to_string(),
        })
}

/// Passes the payload through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadExtractor;

impl ResponseExtractor for PayloadExtractor {
    fn extract(&self, envelope: &EventEnvelope) -> Result<Value, RemoteFailure> {
        remote_error(envelope).map_or_else(|| Ok(envelope.payload.clone()), Err)
    }
}

/// Projects an LLM completion payload onto `{prompt, response, model, finishReason}`.
///
/// Fields missing from the payload are omitted from the result.
#[derive(Debug, Clone, Copy, Default)]
pub struct LlmResponseExtractor;

impl LlmResponseExtractor {
    const FIELDS: [(&'static str, &'static str); 4] = [
        ("prompt", "prompt"),
        ("response", "response"),
        ("model", "model"),
        ("finish_reason", "finishReason"),
    ];
}

impl ResponseExtractor for LlmResponseExtractor {
    fn extract(&self, envelope: &EventEnvelope) -> Result<Value, RemoteFailure> {
        if let Some(failure) = remote_error(envelope) {
            return Err(failure);
        }

        let mut shaped = Map::new();
        for (from, to) in Self::FIELDS {
            if let Some(value) = envelope.payload.get(from).filter(|v| !v.is_null()) {
                shaped.insert(to.to_string(), value.clone());
            }
        }
        Ok(Value::Object(shaped))
    }
}

/// Bus handler that resolves pending calls from response envelopes.
pub struct InboundDispatcher {
    registry: CorrelationRegistry<CallOutcome>,
    extractor: Arc<dyn ResponseExtractor>,
}

impl InboundDispatcher {
    /// Dispatcher using the [`LlmResponseExtractor`].
    #[must_use]
    pub fn new(registry: CorrelationRegistry<CallOutcome>) -> Self {
        Self::with_extractor(registry, Arc::new(LlmResponseExtractor))
    }

    /// Dispatcher using a custom extractor.
    #[must_use]
    pub fn with_extractor(
        registry: CorrelationRegistry<CallOutcome>,
        extractor: Arc<dyn ResponseExtractor>,
    ) -> Self {
        Self {
            registry,
            extractor,
        }
    }

    /// Route one response envelope. Returns `true` if a pending call was resolved.
    pub fn on_message(
        &self,
        topic: &str,
        envelope: &EventEnvelope,
        _headers: &MessageHeaders,
    ) -> bool {
        tracing::info!(
            topic = %topic,
            event_type = %envelope.event_type,
            correlation_id = ?envelope.correlation_id(),
            "Received response"
        );

        let Some(correlation_id) = envelope.correlation_id() else {
            tracing::warn!(
                topic = %topic,
                message_id = %envelope.message_id,
                "No correlation id in response, discarding"
            );
            DispatcherMetrics::record_message("uncorrelated");
            return false;
        };

        let outcome = self.extractor.extract(envelope);
        let resolved = self.registry.resolve(correlation_id, outcome);

        DispatcherMetrics::record_message(if resolved { "resolved" } else { "unmatched" });
        resolved
    }
}

impl MessageHandler for InboundDispatcher {
    fn handle(
        &self,
        topic: String,
        envelope: EventEnvelope,
        headers: MessageHeaders,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + '_>> {
        Box::pin(async move {
            self.on_message(&topic, &envelope, &headers);
            Ok(())
        })
    }
}
