//! Kafka consumer configuration.
//!
//! This module provides the configuration used to connect to Kafka, with
//! support for SASL/SCRAM and TLS, and translates it into librdkafka
//! client settings.
//!
//! # Example
//!
//! ```rust
//! use insight_relay::broker::config::KafkaConsumerConfig;
//!
//! let config = KafkaConsumerConfig::new("localhost:9092", &["test-topic"], "test-group");
//! let params = config.subscription();
//!
//! assert!(!params.enable_auto_commit);
//! assert!(config
//!     .client_settings(&params)
//!     .contains(&("enable.auto.commit".to_string(), "false".to_string())));
//! ```

use super::SubscriptionParams;
use crate::config::KafkaSourceConfig;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Missing required configuration value.
    #[error("Missing required configuration: {0}")]
    MissingConfig(String),

    /// Invalid security protocol specified.
    #[error("Invalid security protocol: {0}")]
    InvalidSecurityProtocol(String),

    /// Invalid SASL mechanism specified.
    #[error("Invalid SASL mechanism: {0}")]
    InvalidSaslMechanism(String),
}

/// Security protocol for Kafka connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SecurityProtocol {
    /// No encryption or authentication.
    #[default]
    Plaintext,
    /// TLS encryption without SASL.
    Ssl,
    /// SASL authentication without TLS.
    SaslPlaintext,
    /// SASL authentication with TLS encryption.
    SaslSsl,
}

impl SecurityProtocol {
    /// Returns the Kafka configuration string for this protocol.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plaintext => "PLAINTEXT",
            Self::Ssl => "SSL",
            Self::SaslPlaintext => "SASL_PLAINTEXT",
            Self::SaslSsl => "SASL_SSL",
        }
    }

    /// Returns true if this protocol authenticates with SASL.
    pub fn uses_sasl(&self) -> bool {
        matches!(self, Self::SaslPlaintext | Self::SaslSsl)
    }

    /// Returns true if this protocol encrypts with TLS.
    pub fn uses_tls(&self) -> bool {
        matches!(self, Self::Ssl | Self::SaslSsl)
    }
}

impl std::str::FromStr for SecurityProtocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PLAINTEXT" => Ok(Self::Plaintext),
            "SSL" => Ok(Self::Ssl),
            "SASL_PLAINTEXT" => Ok(Self::SaslPlaintext),
            "SASL_SSL" => Ok(Self::SaslSsl),
            _ => Err(ConfigError::InvalidSecurityProtocol(s.to_string())),
        }
    }
}

/// SASL authentication mechanism.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SaslMechanism {
    /// PLAIN mechanism (username/password in clear text).
    Plain,
    /// SCRAM-SHA-256 mechanism (recommended).
    #[default]
    ScramSha256,
    /// SCRAM-SHA-512 mechanism.
    ScramSha512,
}

impl SaslMechanism {
    /// Returns the Kafka configuration string for this mechanism.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::ScramSha256 => "SCRAM-SHA-256",
            Self::ScramSha512 => "SCRAM-SHA-512",
        }
    }
}

impl std::str::FromStr for SaslMechanism {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PLAIN" => Ok(Self::Plain),
            "SCRAM-SHA-256" => Ok(Self::ScramSha256),
            "SCRAM-SHA-512" => Ok(Self::ScramSha512),
            _ => Err(ConfigError::InvalidSaslMechanism(s.to_string())),
        }
    }
}

/// SASL authentication configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaslConfig {
    /// Authentication mechanism to use.
    pub mechanism: SaslMechanism,
    /// SASL username.
    pub username: String,
    /// SASL password.
    pub password: String,
}

/// SSL/TLS configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SslConfig {
    /// Path to CA certificate file.
    pub ca_location: Option<String>,
}

/// Kafka consumer configuration.
///
/// Offsets are always committed manually, so `enable_auto_commit` starts
/// out false and nothing in this crate turns it on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaConsumerConfig {
    /// Kafka broker addresses (comma-separated).
    pub brokers: String,

    /// Topics to consume from.
    pub topics: Vec<String>,

    /// Consumer group ID.
    pub group_id: String,

    /// Security protocol for the connection.
    pub security_protocol: SecurityProtocol,

    /// SASL configuration (required for SASL protocols).
    pub sasl_config: Option<SaslConfig>,

    /// SSL configuration.
    pub ssl_config: Option<SslConfig>,

    /// Auto offset reset policy ("earliest" or "latest").
    pub auto_offset_reset: String,

    /// Enable auto commit of offsets.
    pub enable_auto_commit: bool,

    /// Session timeout duration; also bounds the reachability check.
    pub session_timeout: Duration,
}

impl KafkaConsumerConfig {
    /// Creates a new configuration with manual commits and `earliest` reset.
    ///
    /// # Example
    ///
    /// ```rust
    /// use insight_relay::broker::config::KafkaConsumerConfig;
    ///
    /// let config = KafkaConsumerConfig::new("localhost:9092", &["a", "b"], "my-group");
    /// assert_eq!(config.topics, vec!["a".to_string(), "b".to_string()]);
    /// assert_eq!(config.auto_offset_reset, "earliest");
    /// ```
    pub fn new(brokers: &str, topics: &[&str], group_id: &str) -> Self {
        Self {
            brokers: brokers.to_string(),
            topics: topics.iter().map(|t| t.to_string()).collect(),
            group_id: group_id.to_string(),
            security_protocol: SecurityProtocol::default(),
            sasl_config: None,
            ssl_config: None,
            auto_offset_reset: "earliest".to_string(),
            enable_auto_commit: false,
            session_timeout: Duration::from_secs(30),
        }
    }

    /// Builds the consumer configuration from the `kafka` config section.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidSecurityProtocol` or
    /// `ConfigError::InvalidSaslMechanism` for unknown names, and
    /// `ConfigError::MissingConfig` if a SASL protocol lacks credentials.
    pub fn from_settings(settings: &KafkaSourceConfig) -> Result<Self, ConfigError> {
        let mut config = Self {
            brokers: settings.brokers.clone(),
            topics: settings.topics.clone(),
            group_id: settings.group_id.clone(),
            security_protocol: SecurityProtocol::default(),
            sasl_config: None,
            ssl_config: None,
            auto_offset_reset: settings.auto_offset_reset.clone(),
            enable_auto_commit: false,
            session_timeout: Duration::from_secs(settings.session_timeout_secs),
        };

        let Some(security) = &settings.security else {
            return Ok(config);
        };

        config.security_protocol = security.protocol.parse()?;

        if config.security_protocol.uses_sasl() {
            let username = security
                .sasl_username
                .clone()
                .ok_or_else(|| ConfigError::MissingConfig("kafka.security.sasl_username".into()))?;
            let password = security
                .sasl_password
                .clone()
                .ok_or_else(|| ConfigError::MissingConfig("kafka.security.sasl_password".into()))?;
            let mechanism = match &security.sasl_mechanism {
                Some(name) => name.parse()?,
                None => SaslMechanism::default(),
            };

            config.sasl_config = Some(SaslConfig {
                mechanism,
                username,
                password,
            });
        }

        if config.security_protocol.uses_tls() && security.ssl_ca_location.is_some() {
            config.ssl_config = Some(SslConfig {
                ca_location: security.ssl_ca_location.clone(),
            });
        }

        Ok(config)
    }

    /// Returns the parameters identifying this subscription.
    pub fn subscription(&self) -> SubscriptionParams {
        SubscriptionParams {
            brokers: self.brokers.clone(),
            topics: self.topics.clone(),
            group_id: self.group_id.clone(),
            auto_offset_reset: self.auto_offset_reset.clone(),
            enable_auto_commit: self.enable_auto_commit,
        }
    }

    /// Returns the librdkafka settings for a subscription.
    ///
    /// Identity settings come from `params`; security and timeouts from `self`.
    pub fn client_settings(&self, params: &SubscriptionParams) -> Vec<(String, String)> {
        let mut settings = vec![
            ("bootstrap.servers".to_string(), params.brokers.clone()),
            ("group.id".to_string(), params.group_id.clone()),
            (
                "auto.offset.reset".to_string(),
                params.auto_offset_reset.clone(),
            ),
            (
                "enable.auto.commit".to_string(),
                params.enable_auto_commit.to_string(),
            ),
            ("enable.partition.eof".to_string(), "false".to_string()),
            (
                "session.timeout.ms".to_string(),
                self.session_timeout.as_millis().to_string(),
            ),
            (
                "client.id".to_string(),
                format!("insight-relay-{}", params.group_id),
            ),
            (
                "security.protocol".to_string(),
                self.security_protocol.as_str().to_string(),
            ),
        ];

        if let Some(sasl) = &self.sasl_config {
            settings.push((
                "sasl.mechanism".to_string(),
                sasl.mechanism.as_str().to_string(),
            ));
            settings.push(("sasl.username".to_string(), sasl.username.clone()));
            settings.push(("sasl.password".to_string(), sasl.password.clone()));
        }

        if let Some(ca) = self.ssl_config.as_ref().and_then(|s| s.ca_location.as_ref()) {
            settings.push(("ssl.ca.location".to_string(), ca.clone()));
        }

        settings
    }
}
