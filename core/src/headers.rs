//! Message headers carried next to the envelope body.
//!
//! A few envelope fields are duplicated into bus-level headers so that brokers,
//! tracing tools and filters can route on them without parsing the JSON body.

use crate::envelope::EventEnvelope;
use std::collections::BTreeMap;

/// Header carrying the envelope's `eventType`.
pub const EVENT_TYPE_HEADER: &str = "event-type";
/// Header carrying the envelope's `source`.
pub const SOURCE_HEADER: &str = "source";
/// Header carrying the envelope's `timestamp`.
pub const TIMESTAMP_HEADER: &str = "timestamp";
/// Header carrying the envelope's correlation id.
pub const CORRELATION_ID_HEADER: &str = "correlation-id";

/// String-keyed message headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageHeaders(BTreeMap<String, String>);

impl MessageHeaders {
    /// Empty header set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// The standard headers published alongside `envelope`.
    #[must_use]
    pub fn from_envelope(envelope: &EventEnvelope) -> Self {
        let mut headers = Self::new();
        headers.insert(EVENT_TYPE_HEADER, &envelope.event_type);
        headers.insert(SOURCE_HEADER, &envelope.source);
        headers.insert(TIMESTAMP_HEADER, &envelope.timestamp);
        if let Some(correlation_id) = envelope.correlation_id() {
            headers.insert(CORRELATION_ID_HEADER, correlation_id.as_str());
        }
        headers
    }

    /// Insert a header, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Insert a raw header value, decoding it lossily as UTF-8.
    pub fn insert_bytes(&mut self, key: impl Into<String>, value: &[u8]) {
        self.0
            .insert(key.into(), String::from_utf8_lossy(value).into_owned());
    }

    /// Look up a header.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Number of headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` if there are no headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
