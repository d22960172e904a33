//! Configuration management for the gateway.
//!
//! Loaded once from environment variables (after `.env` is applied by `main`),
//! validated, then shared read-only.
//!
//! | Variable                    | Default                          |
//! |-----------------------------|----------------------------------|
//! | `KAFKA_BROKERS`             | required, comma-separated        |
//! | `KAFKA_CLIENT_ID`           | `aether-gateway`                 |
//! | `KAFKA_SERVICE_NAME`        | `node-api-service`               |
//! | `KAFKA_GROUP_ID`            | `nodejs-llm-response-consumer`   |
//! | `KAFKA_PROMPT_TOPIC`        | `user.prompt.create`             |
//! | `KAFKA_TOPICS`              | `llm.response` (response topics) |
//! | `KAFKA_AUTO_OFFSET_RESET`   | `latest`                         |
//! | `KAFKA_SESSION_TIMEOUT_MS`  | `30000`                          |
//! | `KAFKA_HEARTBEAT_INTERVAL_MS` | `3000`                         |
//! | `KAFKA_SECURITY_PROTOCOL`, `KAFKA_CA_CERT`, `KAFKA_CLIENT_CERT`, `KAFKA_CLIENT_KEY`, `KAFKA_SASL_MECHANISM`, `KAFKA_SASL_USERNAME`, `KAFKA_SASL_PASSWORD` | unset |
//! | `BRIDGE_TIMEOUT_MS`         | `30000`                          |
//! | `BRIDGE_DESTINATION`        | `python-ai-service`              |
//! | `HOST` / `PORT`             | `0.0.0.0` / `8080`               |
//! | `SHUTDOWN_TIMEOUT`          | `30` (seconds)                   |

use aether_redpanda::SecurityConfig;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("Environment variable not set: {0}")]
    Missing(&'static str),

    /// A variable could not be parsed.
    #[error("Invalid value '{value}' for {var}: {reason}")]
    Invalid {
        /// Variable name
        var: &'static str,
        /// Raw value
        value: String,
        /// Parser message
        reason: String,
    },

    /// The loaded values are inconsistent.
    #[error("Configuration validation failed: {0}")]
    Validation(String),
}

/// Bus connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaConfig {
    /// Broker addresses.
    pub brokers: Vec<String>,
    /// Kafka `client.id`.
    pub client_id: String,
    /// Name stamped as `source` on outgoing envelopes.
    pub service_name: String,
    /// Consumer group of the response subscription.
    pub group_id: String,
    /// Topic prompt requests are published to.
    pub prompt_topic: String,
    /// Topics the inbound dispatcher consumes.
    pub response_topics: Vec<String>,
    /// Where a new consumer group starts reading.
    pub auto_offset_reset: String,
    /// Consumer session timeout.
    pub session_timeout: Duration,
    /// Consumer heartbeat interval.
    pub heartbeat_interval: Duration,
    /// TLS and SASL settings.
    pub security: SecurityConfig,
}

/// Request/response bridge settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Time a call waits for its response.
    pub timeout: Duration,
    /// `destination` stamped on requests.
    pub destination: String,
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
    /// Grace period for shutdown handlers.
    pub shutdown_timeout: Duration,
}

impl ServerConfig {
    /// `host:port` listen address.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Bus settings.
    pub kafka: KafkaConfig,
    /// Bridge settings.
    pub bridge: BridgeConfig,
    /// Server settings.
    pub server: ServerConfig,
}

const SECURITY_PROTOCOLS: [&str; 4] = ["plaintext", "ssl", "sasl_plaintext", "sasl_ssl"];
const OFFSET_RESETS: [&str; 2] = ["earliest", "latest"];

impl GatewayConfig {
    /// Load from the process environment and validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a required variable is missing, a value does not
    /// parse, or the combination is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from an arbitrary variable source and validate.
    ///
    /// # Errors
    ///
    /// See [`from_env`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let config = Self {
            kafka: KafkaConfig {
                brokers: vars
                    .list("KAFKA_BROKERS")
                    .ok_or(ConfigError::Missing("KAFKA_BROKERS"))?,
                client_id: vars.string("KAFKA_CLIENT_ID", "aether-gateway"),
                service_name: vars.string("KAFKA_SERVICE_NAME", "node-api-service"),
                group_id: vars.string("KAFKA_GROUP_ID", "nodejs-llm-response-consumer"),
                prompt_topic: vars.string("KAFKA_PROMPT_TOPIC", "user.prompt.create"),
                response_topics: vars
                    .list("KAFKA_TOPICS")
                    .unwrap_or_else(|| vec!["llm.response".to_string()]),
                auto_offset_reset: vars.string("KAFKA_AUTO_OFFSET_RESET", "latest").to_lowercase(),
                session_timeout: Duration::from_millis(
                    vars.parse("KAFKA_SESSION_TIMEOUT_MS", 30_000)?,
                ),
                heartbeat_interval: Duration::from_millis(
                    vars.parse("KAFKA_HEARTBEAT_INTERVAL_MS", 3_000)?,
                ),
                security: SecurityConfig {
                    protocol: vars.optional("KAFKA_SECURITY_PROTOCOL").map(|p| p.to_lowercase()),
                    ca_location: vars.optional("KAFKA_CA_CERT"),
                    certificate_location: vars.optional("KAFKA_CLIENT_CERT"),
                    key_location: vars.optional("KAFKA_CLIENT_KEY"),
                    sasl_mechanism: vars.optional("KAFKA_SASL_MECHANISM"),
                    sasl_username: vars.optional("KAFKA_SASL_USERNAME"),
                    sasl_password: vars.optional("KAFKA_SASL_PASSWORD"),
                },
            },
            bridge: BridgeConfig {
                timeout: Duration::from_millis(vars.parse("BRIDGE_TIMEOUT_MS", 30_000)?),
                destination: vars.string("BRIDGE_DESTINATION", "python-ai-service"),
            },
            server: ServerConfig {
                host: vars.string("HOST", "0.0.0.0"),
                port: vars.parse("PORT", 8080)?,
                shutdown_timeout: Duration::from_secs(vars.parse("SHUTDOWN_TIMEOUT", 30)?),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: String| Err(ConfigError::Validation(msg));
        let kafka = &self.kafka;

        if kafka.brokers.is_empty() {
            return fail("at least one broker is required".to_string());
        }
        if kafka.group_id.trim().is_empty() {
            return fail("consumer group id must not be empty".to_string());
        }
        if kafka.prompt_topic.trim().is_empty() {
            return fail("prompt topic must not be empty".to_string());
        }
        if kafka.response_topics.is_empty() {
            return fail("at least one response topic is required".to_string());
        }
        if kafka.response_topics.contains(&kafka.prompt_topic) {
            return fail(format!(
                "prompt topic '{}' is also consumed as a response topic",
                kafka.prompt_topic
            ));
        }
        if !OFFSET_RESETS.contains(&kafka.auto_offset_reset.as_str()) {
            return fail(format!(
                "auto offset reset must be one of {OFFSET_RESETS:?}, got '{}'",
                kafka.auto_offset_reset
            ));
        }
        if kafka.heartbeat_interval >= kafka.session_timeout {
            return fail("heartbeat interval must be shorter than the session timeout".to_string());
        }

        let security = &kafka.security;
        if let Some(protocol) = &security.protocol {
            if !SECURITY_PROTOCOLS.contains(&protocol.as_str()) {
                return fail(format!(
                    "security protocol must be one of {SECURITY_PROTOCOLS:?}, got '{protocol}'"
                ));
            }
        }
        if security.certificate_location.is_some() != security.key_location.is_some() {
            return fail("client certificate and key must be set together".to_string());
        }
        if security.sasl_username.is_some() != security.sasl_password.is_some() {
            return fail("SASL username and password must be set together".to_string());
        }

        if self.bridge.timeout.is_zero() {
            return fail("bridge timeout must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Typed access to a variable source.
struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn list(&self, key: &str) -> Option<Vec<String>> {
        let items: Vec<String> = self
            .optional(key)?
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect();
        (!items.is_empty()).then_some(items)
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(key).map_or(Ok(default), |value| {
            value.parse().map_err(|e: T::Err| ConfigError::Invalid {
                var: key,
                reason: e.to_string(),
                value,
            })
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<GatewayConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        GatewayConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_brokers_are_set() {
        let config = load(&[("KAFKA_BROKERS", "broker-1:9092, broker-2:9092 ,")])
            .expect("config should load");

        assert_eq!(config.kafka.brokers, vec!["broker-1:9092", "broker-2:9092"]);
        assert_eq!(config.kafka.group_id, "nodejs-llm-response-consumer");
        assert_eq!(config.kafka.response_topics, vec!["llm.response"]);
        assert_eq!(config.kafka.auto_offset_reset, "latest");
        assert_eq!(config.bridge.timeout, Duration::from_secs(30));
        assert_eq!(config.bridge.destination, "python-ai-service");
        assert_eq!(config.server.address(), "0.0.0.0:8080");
        assert!(!config.kafka.security.is_configured());
    }

    #[test]
    fn brokers_are_required() {
        assert_eq!(load(&[]), Err(ConfigError::Missing("KAFKA_BROKERS")));
        assert_eq!(
            load(&[("KAFKA_BROKERS", " , ")]),
            Err(ConfigError::Missing("KAFKA_BROKERS"))
        );
    }

    #[test]
    fn unparsable_numbers_are_reported() {
        let err = load(&[("KAFKA_BROKERS", "b:9092"), ("PORT", "eighty")])
            .expect_err("port should not parse");
        assert!(matches!(err, ConfigError::Invalid { var: "PORT", .. }));
    }

    #[test]
    fn security_settings_are_loaded_and_checked() {
        let config = load(&[
            ("KAFKA_BROKERS", "b:9093"),
            ("KAFKA_SECURITY_PROTOCOL", "SASL_SSL"),
            ("KAFKA_SASL_MECHANISM", "SCRAM-SHA-256"),
            ("KAFKA_SASL_USERNAME", "gateway"),
            ("KAFKA_SASL_PASSWORD", "secret"),
        ])
        .expect("config should load");
        assert_eq!(config.kafka.security.protocol.as_deref(), Some("sasl_ssl"));

        let err = load(&[("KAFKA_BROKERS", "b:9093"), ("KAFKA_CLIENT_CERT", "/certs/client.pem")])
            .expect_err("cert without key");
        assert!(matches!(err, ConfigError::Validation(_)));

        let err = load(&[("KAFKA_BROKERS", "b:9093"), ("KAFKA_SECURITY_PROTOCOL", "tls")])
            .expect_err("unknown protocol");
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn inconsistent_values_are_rejected() {
        for vars in [
            vec![("KAFKA_BROKERS", "b:9092"), ("BRIDGE_TIMEOUT_MS", "0")],
            vec![("KAFKA_BROKERS", "b:9092"), ("KAFKA_TOPICS", "user.prompt.create")],
            vec![("KAFKA_BROKERS", "b:9092"), ("KAFKA_AUTO_OFFSET_RESET", "middle")],
            vec![("KAFKA_BROKERS", "b:9092"), ("KAFKA_HEARTBEAT_INTERVAL_MS", "30000")],
        ] {
            let err = load(&vars).expect_err("config should be rejected");
            assert!(matches!(err, ConfigError::Validation(_)), "{vars:?}: {err}");
        }
    }
}
