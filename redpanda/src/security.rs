//! TLS and SASL settings shared by the producer and every consumer.

use rdkafka::config::ClientConfig;
use std::fmt;

/// Connection security for a Kafka-compatible cluster.
///
/// All fields are optional; unset fields leave librdkafka's defaults in place
/// (plaintext, no authentication).
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SecurityConfig {
    /// `security.protocol`: `plaintext`, `ssl`, `sasl_plaintext` or `sasl_ssl`
    pub protocol: Option<String>,
    /// `ssl.ca.location`
    pub ca_location: Option<String>,
    /// `ssl.certificate.location`
    pub certificate_location: Option<String>,
    /// `ssl.key.location`
    pub key_location: Option<String>,
    /// `sasl.mechanism`, e.g. `PLAIN` or `SCRAM-SHA-256`
    pub sasl_mechanism: Option<String>,
    /// `sasl.username`
    pub sasl_username: Option<String>,
    /// `sasl.password`
    pub sasl_password: Option<String>,
}

impl SecurityConfig {
    /// Whether any security setting is present.
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.protocol.is_some()
            || self.ca_location.is_some()
            || self.certificate_location.is_some()
            || self.key_location.is_some()
            || self.sasl_mechanism.is_some()
    }

    /// Write the configured settings into `config`.
    pub fn apply(&self, config: &mut ClientConfig) {
        let settings = [
            ("security.protocol", &self.protocol),
            ("ssl.ca.location", &self.ca_location),
            ("ssl.certificate.location", &self.certificate_location),
            ("ssl.key.location", &self.key_location),
            ("sasl.mechanism", &self.sasl_mechanism),
            ("sasl.username", &self.sasl_username),
            ("sasl.password", &self.sasl_password),
        ];
        for (key, value) in settings {
            if let Some(value) = value {
                config.set(key, value);
            }
        }
    }
}

impl fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("protocol", &self.protocol)
            .field("ca_location", &self.ca_location)
            .field("certificate_location", &self.certificate_location)
            .field("key_location", &self.key_location)
            .field("sasl_mechanism", &self.sasl_mechanism)
            .field("sasl_username", &self.sasl_username)
            .field("sasl_password", &self.sasl_password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
