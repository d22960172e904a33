//! Scripted backend worker for end-to-end tests.
//!
//! A [`Responder`] subscribes to a request topic and answers each request on a
//! response topic, copying the request's correlation id the way the real backend
//! does. The reply is chosen per request by a closure, so tests can answer, stay
//! silent, fail, or answer twice.

use crate::bus::InMemoryBus;
use aether_core::{
    BusError, EventEnvelope, HandlerError, MessageBus, MessageHeaders, SubscribeOutcome,
};
use serde_json::Value;
use std::sync::Arc;

/// What the responder does with one request.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Publish one response with this event type and payload.
    Respond {
        /// Response event type
        event_type: String,
        /// Response payload
        payload: Value,
    },
    /// Publish the same response twice (duplicate delivery).
    RespondTwice {
        /// Response event type
        event_type: String,
        /// Response payload
        payload: Value,
    },
    /// Never answer.
    Silent,
}

impl Reply {
    /// Respond once with `payload`.
    #[must_use]
    pub fn respond(event_type: impl Into<String>, payload: Value) -> Self {
        Self::Respond {
            event_type: event_type.into(),
            payload,
        }
    }
}

type Script = dyn Fn(&EventEnvelope) -> Reply + Send + Sync;

/// Backend stand-in answering requests on an [`InMemoryBus`].
pub struct Responder {
    bus: InMemoryBus,
    service_name: String,
    response_topic: String,
}

impl Responder {
    /// Create a responder publishing replies to `response_topic` as `service_name`.
    #[must_use]
    pub fn new(
        bus: InMemoryBus,
        service_name: impl Into<String>,
        response_topic: impl Into<String>,
    ) -> Self {
        Self {
            bus,
            service_name: service_name.into(),
            response_topic: response_topic.into(),
        }
    }

    /// Subscribe to `request_topic` under `group_id` and answer with `script`.
    ///
    /// # Errors
    ///
    /// Returns the bus error if the subscription fails.
    pub async fn serve<F>(
        self,
        request_topic: &str,
        group_id: &str,
        script: F,
    ) -> Result<SubscribeOutcome, BusError>
    where
        F: Fn(&EventEnvelope) -> Reply + Send + Sync + 'static,
    {
        let script: Arc<Script> = Arc::new(script);
        let this = Arc::new(self);
        let bus = this.bus.clone();

        let handler = move |_topic: String, request: EventEnvelope, _headers: MessageHeaders| {
            let this = Arc::clone(&this);
            let script = Arc::clone(&script);
            async move {
                let (event_type, payload, times) = match script(&request) {
                    Reply::Respond {
                        event_type,
                        payload,
                    } => (event_type, payload, 1),
                    Reply::RespondTwice {
                        event_type,
                        payload,
                    } => (event_type, payload, 2),
                    Reply::Silent => return Ok::<(), HandlerError>(()),
                };

                let response =
                    EventEnvelope::reply_to(&request, &this.service_name, event_type, payload);
                for _ in 0..times {
                    this.bus
                        .publish(&this.response_topic, &response, None)
                        .await?;
                }
                Ok(())
            }
        };

        bus.subscribe(&[request_topic], group_id, Arc::new(handler)).await
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)] // Panics: Tests fail loudly on unexpected bus errors
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn replies_carry_the_request_correlation_id() {
        let bus = InMemoryBus::new("gateway");
        Responder::new(bus.clone(), "worker", "responses")
            .serve("requests", "worker-group", |request| {
                Reply::respond("ECHO", request.payload.clone())
            })
            .await
            .expect("subscribe should succeed");

        let request = bus.create_envelope("PING", json!({"n": 1}), Some("worker"));
        bus.publish("requests", &request, None)
            .await
            .expect("publish should succeed");
        bus.drain().await;

        let replies = bus.published_to("responses");
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].envelope.correlation_id(), request.correlation_id());
        assert_eq!(replies[0].envelope.source, "worker");
        assert_eq!(replies[0].envelope.destination.as_deref(), Some("gateway"));
        assert_eq!(replies[0].envelope.payload, json!({"n": 1}));
    }
}
