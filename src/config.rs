//! Configuration management for insight-relay
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//! The resulting [`Config`] is built once at process entry and handed by
//! value or reference to the supervisor and the reporter; nothing reads
//! configuration from the environment after startup.

use crate::error::{RelayError, Result};
use crate::filter::DEFAULT_POST_TYPES;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Main configuration structure for insight-relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Inbound Kafka subscription
    #[serde(default)]
    pub kafka: KafkaSourceConfig,

    /// Outbound ingestion API
    #[serde(default)]
    pub sink: SinkConfig,

    /// Document filtering
    #[serde(default)]
    pub filter: FilterConfig,

    /// Connection supervision and redelivery timing
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Kafka consumer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KafkaSourceConfig {
    /// Kafka brokers (comma-separated)
    #[serde(default = "default_brokers")]
    pub brokers: String,

    /// Topics to subscribe to
    #[serde(default = "default_topics")]
    pub topics: Vec<String>,

    /// Consumer group ID
    #[serde(default = "default_group_id")]
    pub group_id: String,

    /// Where a brand-new group starts reading ("earliest" or "latest")
    #[serde(default = "default_auto_offset_reset")]
    pub auto_offset_reset: String,

    /// Maximum time to wait for the next batch, in seconds
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,

    /// Maximum messages handled per poll
    #[serde(default = "default_max_poll_records")]
    pub max_poll_records: usize,

    /// Group session timeout, in seconds
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,

    /// Security configuration
    #[serde(default)]
    pub security: Option<KafkaSecurityConfig>,
}

/// Kafka security configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KafkaSecurityConfig {
    /// Security protocol (PLAINTEXT, SSL, SASL_PLAINTEXT, SASL_SSL)
    pub protocol: String,

    /// SASL mechanism (PLAIN, SCRAM-SHA-256, SCRAM-SHA-512)
    #[serde(default)]
    pub sasl_mechanism: Option<String>,

    /// SASL username
    #[serde(default)]
    pub sasl_username: Option<String>,

    /// SASL password (prefer env var INSIGHT_KAFKA_SASL_PASSWORD)
    #[serde(default)]
    pub sasl_password: Option<String>,

    /// CA certificate path for SSL protocols
    #[serde(default)]
    pub ssl_ca_location: Option<String>,
}

/// Ingestion API configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Full URL documents are POSTed to
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Shared secret sent as `X-Sync-Token`
    #[serde(default)]
    pub sync_token: String,

    /// Request timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

/// Document filter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// `post_type` values forwarded downstream
    #[serde(default = "default_post_types")]
    pub post_types: Vec<i64>,
}

/// What to do with a message whose value cannot be decoded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodeErrorPolicy {
    /// Withhold the commit so the message is redelivered
    #[default]
    Retry,
    /// Log the message and commit past it
    Skip,
}

/// Supervisor timing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Fixed delay before reconnecting after a broker fault, in seconds
    #[serde(default = "default_reconnect_backoff")]
    pub reconnect_backoff_secs: u64,

    /// Delay before polling again after a withheld commit, in seconds
    #[serde(default = "default_redelivery_delay")]
    pub redelivery_delay_secs: u64,

    /// Handling of undecodable message values
    #[serde(default)]
    pub decode_error_policy: DecodeErrorPolicy,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Enable JSON-formatted logs
    #[serde(default = "default_json_logs")]
    pub json_format: bool,

    /// Log file path (if None, STDOUT only)
    #[serde(default)]
    pub file_path: Option<PathBuf>,
}

fn default_brokers() -> String {
    "localhost:9092".to_string()
}

fn default_topics() -> Vec<String> {
    vec!["test-topic".to_string()]
}

fn default_group_id() -> String {
    "test-group".to_string()
}

fn default_auto_offset_reset() -> String {
    "earliest".to_string()
}

fn default_poll_timeout() -> u64 {
    100
}

fn default_max_poll_records() -> usize {
    100
}

fn default_session_timeout() -> u64 {
    30
}

fn default_api_url() -> String {
    "http://localhost:8000/api/insight/sync".to_string()
}

fn default_http_timeout() -> u64 {
    30
}

fn default_post_types() -> Vec<i64> {
    DEFAULT_POST_TYPES.to_vec()
}

fn default_reconnect_backoff() -> u64 {
    5
}

fn default_redelivery_delay() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_json_logs() -> bool {
    true
}

impl Default for KafkaSourceConfig {
    fn default() -> Self {
        Self {
            brokers: default_brokers(),
            topics: default_topics(),
            group_id: default_group_id(),
            auto_offset_reset: default_auto_offset_reset(),
            poll_timeout_secs: default_poll_timeout(),
            max_poll_records: default_max_poll_records(),
            session_timeout_secs: default_session_timeout(),
            security: None,
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            sync_token: String::new(),
            timeout_secs: default_http_timeout(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            post_types: default_post_types(),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            reconnect_backoff_secs: default_reconnect_backoff(),
            redelivery_delay_secs: default_redelivery_delay(),
            decode_error_policy: DecodeErrorPolicy::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: default_json_logs(),
            file_path: None,
        }
    }
}

const REDACTED: &str = "********";

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RelayError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| RelayError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        // Sink overrides
        if let Ok(api_url) = std::env::var("INSIGHT_API_URL") {
            self.sink.api_url = api_url;
        }

        if let Ok(token) = std::env::var("INSIGHT_SYNC_TOKEN") {
            self.sink.sync_token = token;
        }

        if let Some(timeout) = parse_env("INSIGHT_HTTP_TIMEOUT") {
            self.sink.timeout_secs = timeout;
        }

        // Kafka overrides
        if let Ok(brokers) = std::env::var("INSIGHT_KAFKA_BROKERS") {
            self.kafka.brokers = brokers;
        }

        if let Ok(topics) = std::env::var("INSIGHT_KAFKA_TOPICS") {
            let topics = split_list(&topics);
            if !topics.is_empty() {
                tracing::debug!(?topics, "Env override: INSIGHT_KAFKA_TOPICS");
                self.kafka.topics = topics;
            }
        }

        if let Ok(group_id) = std::env::var("INSIGHT_KAFKA_GROUP_ID") {
            self.kafka.group_id = group_id;
        }

        if let Some(poll_timeout) = parse_env("INSIGHT_KAFKA_POLL_TIMEOUT") {
            self.kafka.poll_timeout_secs = poll_timeout;
        }

        if let Some(max_records) = parse_env("INSIGHT_KAFKA_MAX_POLL_RECORDS") {
            self.kafka.max_poll_records = max_records;
        }

        if let Ok(protocol) = std::env::var("INSIGHT_KAFKA_SECURITY_PROTOCOL") {
            let security = self.kafka.security.get_or_insert(KafkaSecurityConfig {
                protocol: String::new(),
                sasl_mechanism: None,
                sasl_username: None,
                sasl_password: None,
                ssl_ca_location: None,
            });
            security.protocol = protocol;
        }

        if let Some(security) = self.kafka.security.as_mut() {
            if let Ok(mechanism) = std::env::var("INSIGHT_KAFKA_SASL_MECHANISM") {
                security.sasl_mechanism = Some(mechanism);
            }
            if let Ok(username) = std::env::var("INSIGHT_KAFKA_SASL_USERNAME") {
                security.sasl_username = Some(username);
            }
            if let Ok(password) = std::env::var("INSIGHT_KAFKA_SASL_PASSWORD") {
                security.sasl_password = Some(password);
            }
            if let Ok(ca) = std::env::var("INSIGHT_KAFKA_SSL_CA_LOCATION") {
                security.ssl_ca_location = Some(ca);
            }
        } else {
            let ignored = ignored_security_env_vars();
            if !ignored.is_empty() {
                tracing::warn!(
                    ?ignored,
                    "Kafka security variables ignored: no kafka.security section and no INSIGHT_KAFKA_SECURITY_PROTOCOL"
                );
            }
        }

        // Filter overrides
        if let Ok(post_types) = std::env::var("INSIGHT_POST_TYPES") {
            let parsed: std::result::Result<Vec<i64>, _> =
                split_list(&post_types).iter().map(|s| s.parse()).collect();
            match parsed {
                Ok(types) if !types.is_empty() => self.filter.post_types = types,
                _ => tracing::warn!("Invalid INSIGHT_POST_TYPES: {}", post_types),
            }
        }

        // Supervisor overrides
        if let Some(backoff) = parse_env("INSIGHT_RECONNECT_BACKOFF_SECS") {
            self.supervisor.reconnect_backoff_secs = backoff;
        }

        // Logging overrides
        if let Ok(level) = std::env::var("INSIGHT_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(json) = parse_env("INSIGHT_JSON_LOGS") {
            self.logging.json_format = json;
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            self.logging.level = "debug".to_string();
        }

        if let crate::cli::Commands::Consume {
            topics,
            brokers,
            group_id,
            json_logs,
            log_file,
        } = &cli.command
        {
            if !topics.is_empty() {
                self.kafka.topics = topics.clone();
            }
            if let Some(brokers) = brokers {
                self.kafka.brokers = brokers.clone();
            }
            if let Some(group_id) = group_id {
                self.kafka.group_id = group_id.clone();
            }
            if *json_logs {
                self.logging.json_format = true;
            }
            if let Some(log_file) = log_file {
                self.logging.file_path = Some(log_file.clone());
            }
        }
    }

    /// Validate the configuration
    ///
    /// An empty API URL or sync token is accepted here: it is reported per
    /// message at dispatch time so that commits are withheld rather than the
    /// process refusing to start.
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.kafka.brokers.trim().is_empty() {
            return Err(RelayError::Config("kafka.brokers cannot be empty".to_string()).into());
        }

        if self.kafka.topics.iter().all(|t| t.trim().is_empty()) {
            return Err(
                RelayError::Config("kafka.topics must name at least one topic".to_string()).into(),
            );
        }

        if self.kafka.group_id.trim().is_empty() {
            return Err(RelayError::Config("kafka.group_id cannot be empty".to_string()).into());
        }

        let valid_resets = ["earliest", "latest"];
        if !valid_resets.contains(&self.kafka.auto_offset_reset.as_str()) {
            return Err(RelayError::Config(format!(
                "Invalid kafka.auto_offset_reset: {}. Must be one of: {}",
                self.kafka.auto_offset_reset,
                valid_resets.join(", ")
            ))
            .into());
        }

        if self.kafka.poll_timeout_secs == 0 {
            return Err(RelayError::Config(
                "kafka.poll_timeout_secs must be greater than 0".to_string(),
            )
            .into());
        }

        if self.kafka.max_poll_records == 0 {
            return Err(RelayError::Config(
                "kafka.max_poll_records must be greater than 0".to_string(),
            )
            .into());
        }

        if self.sink.timeout_secs == 0 {
            return Err(
                RelayError::Config("sink.timeout_secs must be greater than 0".to_string()).into(),
            );
        }

        if !self.sink.api_url.trim().is_empty() {
            let url = url::Url::parse(&self.sink.api_url).map_err(|e| {
                RelayError::Config(format!("Invalid sink.api_url {}: {}", self.sink.api_url, e))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(RelayError::Config(format!(
                    "sink.api_url must use http or https, got {}",
                    url.scheme()
                ))
                .into());
            }
        }

        if self.filter.post_types.is_empty() {
            return Err(
                RelayError::Config("filter.post_types cannot be empty".to_string()).into(),
            );
        }

        Ok(())
    }

    /// Returns a copy with secrets masked, suitable for printing.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.sink.sync_token.is_empty() {
            copy.sink.sync_token = REDACTED.to_string();
        }
        if let Some(security) = copy.kafka.security.as_mut() {
            if security.sasl_password.is_some() {
                security.sasl_password = Some(REDACTED.to_string());
            }
        }
        copy
    }
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Invalid {}: {}", name, raw);
            None
        }
    }
}

const SECURITY_DETAIL_ENV_VARS: [&str; 4] = [
    "INSIGHT_KAFKA_SASL_MECHANISM",
    "INSIGHT_KAFKA_SASL_USERNAME",
    "INSIGHT_KAFKA_SASL_PASSWORD",
    "INSIGHT_KAFKA_SSL_CA_LOCATION",
];

// Security detail variables only apply once a protocol is known.
fn ignored_security_env_vars() -> Vec<&'static str> {
    SECURITY_DETAIL_ENV_VARS
        .into_iter()
        .filter(|name| std::env::var_os(name).is_some())
        .collect()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
