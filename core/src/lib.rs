//! # Aether Core
//!
//! Core types for the Aether gateway: the event envelope exchanged with the
//! backend, the message bus abstraction, and the delivery rules every consume
//! loop follows.
//!
//! The gateway turns a fire-and-forget publish/subscribe bus into a
//! synchronous-looking call. This crate holds the pieces that have no knowledge of
//! that correlation logic:
//!
//! - [`envelope`]: [`EventEnvelope`], [`CorrelationId`], metadata and the JSON wire format
//! - [`headers`]: bus-level headers duplicated from the envelope
//! - [`bus`]: [`MessageBus`], [`MessageHandler`], [`BusError`] and [`deliver`]
//!
//! ## Example
//!
//! ```
//! use aether_core::{EventEnvelope, MessageHeaders};
//! use serde_json::json;
//!
//! let envelope = EventEnvelope::new("gateway", "PING", json!({}), None);
//! let headers = MessageHeaders::from_envelope(&envelope);
//! assert_eq!(headers.get("event-type"), Some("PING"));
//! ```

pub mod bus;
pub mod envelope;
pub mod headers;

pub use bus::{
    BusError, BusFuture, ConsumerGroupState, DeliveryOutcome, HandlerError, MessageBus,
    MessageHandler, SubscribeOutcome, deliver,
};
pub use envelope::{CorrelationId, EventEnvelope, Metadata, Priority, SCHEMA_VERSION};
pub use headers::MessageHeaders;
