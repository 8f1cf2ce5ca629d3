//! Error types for insight-relay
//!
//! This module defines the process-level error type, using `thiserror` for
//! ergonomic error handling. Per-message failures are not errors at this
//! level: decoding problems are [`crate::document::DecodeError`] and delivery
//! problems are [`crate::reporter::ReportFailure`], both of which end up as a
//! withheld commit rather than an `Err`.

use crate::broker::BrokerError;
use thiserror::Error;

/// Main error type for insight-relay operations
#[derive(Error, Debug)]
pub enum RelayError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Broker connection or commit errors
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for insight-relay operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
