//! HTTP delivery of documents to the ingestion API.
//!
//! Every eligible document is posted as `{"item_doc": <document>}` with a
//! shared-secret `X-Sync-Token` header. The call never returns an error:
//! each failure mode collapses into a [`ReportOutcome::Failed`] carrying a
//! [`ReportFailure`] whose category is logged for operators.
//!
//! # Example
//!
//! ```rust,no_run
//! use insight_relay::config::SinkConfig;
//! use insight_relay::document::Envelope;
//! use insight_relay::reporter::{DocumentSink, Reporter};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let reporter = Reporter::new(SinkConfig {
//!         api_url: "http://localhost:8000/api/insight/sync".to_string(),
//!         sync_token: "secret".to_string(),
//!         timeout_secs: 30,
//!     })?;
//!
//!     let envelope = Envelope::decode(br#"{"item_doc": {"post_type": 1, "origin_id": "1"}}"#)?;
//!     let outcome = reporter.report(&envelope.item_doc).await;
//!     println!("delivered: {}", outcome.is_delivered());
//!     Ok(())
//! }
//! ```

use crate::config::SinkConfig;
use crate::document::{Document, SyncRequest};
use crate::error::RelayError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Header carrying the shared secret expected by the ingestion API.
pub const SYNC_TOKEN_HEADER: &str = "X-Sync-Token";

/// Why a delivery attempt failed.
///
/// All variants are retried identically (by redelivery); the distinction
/// exists for logs and metrics only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReportFailure {
    /// API URL or sync token is empty at dispatch time.
    #[error("{0} is not configured")]
    ConfigMissing(&'static str),

    /// The API rejected the sync token (HTTP 401).
    #[error("sync token rejected (status {status}): {body}")]
    Auth {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// Any other 4xx response.
    #[error("client error (status {status}): {body}")]
    Client {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// A 5xx response.
    #[error("server error (status {status}): {body}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// A status that is neither 200 nor an error class.
    #[error("unexpected status {status}: {body}")]
    UnknownStatus {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The request did not complete within the client timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The API could not be reached.
    #[error("connection error: {0}")]
    Connection(String),

    /// The request body could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Anything else raised by the HTTP client.
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl ReportFailure {
    /// Log/metric category for this failure.
    pub fn category(&self) -> &'static str {
        match self {
            Self::ConfigMissing(_) => "config_missing",
            Self::Auth { .. } => "auth_error",
            Self::Client { .. } => "client_error",
            Self::Server { .. } => "server_error",
            Self::UnknownStatus { .. } => "unknown_status",
            Self::Timeout(_) => "timeout",
            Self::Connection(_) => "connection_error",
            Self::Serialization(_) => "serialization_error",
            Self::Unknown(_) => "unknown_error",
        }
    }
}

/// Result of a single delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// The API answered 200.
    Delivered,
    /// The attempt failed; the commit must be withheld.
    Failed(ReportFailure),
}

impl ReportOutcome {
    /// Returns true if the document was accepted downstream.
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }

    /// Classifies an HTTP status code and response body.
    ///
    /// # Examples
    ///
    /// ```
    /// use insight_relay::reporter::{ReportFailure, ReportOutcome};
    /// use reqwest::StatusCode;
    ///
    /// assert!(ReportOutcome::from_status(StatusCode::OK, String::new()).is_delivered());
    /// assert!(matches!(
    ///     ReportOutcome::from_status(StatusCode::UNAUTHORIZED, String::new()),
    ///     ReportOutcome::Failed(ReportFailure::Auth { status: 401, .. })
    /// ));
    /// ```
    pub fn from_status(status: StatusCode, body: String) -> Self {
        let code = status.as_u16();
        match code {
            200 => Self::Delivered,
            401 => Self::Failed(ReportFailure::Auth { status: code, body }),
            400..=499 => Self::Failed(ReportFailure::Client { status: code, body }),
            500.. => Self::Failed(ReportFailure::Server { status: code, body }),
            _ => Self::Failed(ReportFailure::UnknownStatus { status: code, body }),
        }
    }
}

/// Destination for eligible documents.
///
/// Implementations must never panic or propagate errors; every failure is
/// expressed as [`ReportOutcome::Failed`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentSink: Send + Sync {
    /// Deliver one document.
    async fn report(&self, document: &Document) -> ReportOutcome;
}

/// Ingestion API client.
pub struct Reporter {
    client: Client,
    config: SinkConfig,
}

impl Reporter {
    /// Creates a new reporter.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Http` if the HTTP client cannot be created.
    pub fn new(config: SinkConfig) -> Result<Self, RelayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    /// Returns the configured API URL.
    pub fn endpoint(&self) -> &str {
        &self.config.api_url
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    async fn send(&self, document: &Document) -> ReportOutcome {
        if self.config.api_url.trim().is_empty() {
            return ReportOutcome::Failed(ReportFailure::ConfigMissing("INSIGHT_API_URL"));
        }
        if self.config.sync_token.is_empty() {
            return ReportOutcome::Failed(ReportFailure::ConfigMissing("INSIGHT_SYNC_TOKEN"));
        }

        let body = match serde_json::to_vec(&SyncRequest { item_doc: document }) {
            Ok(body) => body,
            Err(e) => return ReportOutcome::Failed(ReportFailure::Serialization(e.to_string())),
        };

        let response = match self
            .client
            .post(&self.config.api_url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SYNC_TOKEN_HEADER, &self.config.sync_token)
            .body(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return ReportOutcome::Failed(self.classify_transport_error(e)),
        };

        let status = response.status();
        let body = if status == StatusCode::OK {
            String::new()
        } else {
            response.text().await.unwrap_or_default()
        };

        ReportOutcome::from_status(status, body)
    }

    fn classify_transport_error(&self, err: reqwest::Error) -> ReportFailure {
        if err.is_timeout() {
            ReportFailure::Timeout(self.timeout())
        } else if err.is_connect() {
            ReportFailure::Connection(err.to_string())
        } else {
            ReportFailure::Unknown(err.to_string())
        }
    }
}

#[async_trait]
impl DocumentSink for Reporter {
    async fn report(&self, document: &Document) -> ReportOutcome {
        let outcome = self.send(document).await;
        log_outcome(document, &outcome);
        outcome
    }
}

fn log_outcome(document: &Document, outcome: &ReportOutcome) {
    let origin_id = document.origin_id().unwrap_or_else(|| "unknown".to_string());
    let post_id = document.post_id().unwrap_or_else(|| "unknown".to_string());

    let failure = match outcome {
        ReportOutcome::Delivered => {
            info!(origin_id = %origin_id, post_id = %post_id, "Report delivered");
            return;
        }
        ReportOutcome::Failed(failure) => failure,
    };

    let category = failure.category();
    match failure {
        ReportFailure::ConfigMissing(setting) => {
            error!(category, setting = %setting, "Report skipped: configuration missing");
        }
        ReportFailure::Auth { status, body } => {
            error!(category, status, body = %body, origin_id = %origin_id, "Report failed: sync token rejected");
        }
        ReportFailure::Client { status, body } => {
            error!(category, status, body = %body, origin_id = %origin_id, "Report failed: client error");
        }
        ReportFailure::Server { status, body } => {
            error!(category, status, body = %body, origin_id = %origin_id, "Report failed: server error");
        }
        ReportFailure::UnknownStatus { status, body } => {
            warn!(category, status, body = %body, origin_id = %origin_id, "Report failed: unexpected status");
        }
        ReportFailure::Timeout(after) => {
            error!(category, timeout = ?after, origin_id = %origin_id, "Report failed: request timed out");
        }
        ReportFailure::Connection(e) => {
            error!(category, error = %e, origin_id = %origin_id, "Report failed: connection error");
        }
        ReportFailure::Serialization(e) => {
            error!(category, error = %e, origin_id = %origin_id, "Report failed: body serialization");
        }
        ReportFailure::Unknown(e) => {
            error!(category, error = %e, origin_id = %origin_id, "Report failed: unknown error");
        }
    }
}
