//! Per-message processing: decode, filter, report.
//!
//! [`Pipeline::process`] turns one inbound message into a
//! [`DeliveryOutcome`]. It never fails: decode errors and report failures
//! are values that only decide whether the offset may be committed.

use crate::broker::InboundMessage;
use crate::config::DecodeErrorPolicy;
use crate::document::{DecodeError, Envelope};
use crate::filter::PostTypeFilter;
use crate::metrics;
use crate::reporter::{DocumentSink, ReportFailure, ReportOutcome};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Why a message could not be handled.
#[derive(Debug)]
pub enum FailureCause {
    /// The message value was not a valid envelope.
    Decode(DecodeError),
    /// The ingestion API did not accept the document.
    Report(ReportFailure),
}

impl std::fmt::Display for FailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "decode failed: {}", e),
            Self::Report(e) => write!(f, "report failed: {}", e),
        }
    }
}

/// Classification of one message.
#[derive(Debug)]
pub enum DeliveryOutcome {
    /// Not eligible for delivery; trivially successful.
    Skipped,
    /// Accepted by the ingestion API.
    Delivered,
    /// Not handled; the commit must be withheld.
    Failed(FailureCause),
}

impl DeliveryOutcome {
    /// Returns true when the offset may be committed.
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }

    /// Metric/log label for this outcome.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::Delivered => "delivered",
            Self::Failed(_) => "failed",
        }
    }
}

/// Decode, filter and report stages for a single message.
pub struct Pipeline {
    filter: PostTypeFilter,
    sink: Arc<dyn DocumentSink>,
    decode_error_policy: DecodeErrorPolicy,
}

impl Pipeline {
    /// Creates a pipeline.
    pub fn new(
        filter: PostTypeFilter,
        sink: Arc<dyn DocumentSink>,
        decode_error_policy: DecodeErrorPolicy,
    ) -> Self {
        Self {
            filter,
            sink,
            decode_error_policy,
        }
    }

    /// Returns the filter in use.
    pub fn filter(&self) -> &PostTypeFilter {
        &self.filter
    }

    /// Processes one message.
    pub async fn process(&self, message: &InboundMessage) -> DeliveryOutcome {
        let outcome = self.evaluate(message).await;
        metrics::record_message_outcome(outcome.label());
        outcome
    }

    async fn evaluate(&self, message: &InboundMessage) -> DeliveryOutcome {
        let decoded = match message.payload.as_deref() {
            Some(payload) => Envelope::decode(payload),
            None => Err(DecodeError::Empty),
        };

        let envelope = match decoded {
            Ok(envelope) => envelope,
            Err(e) => return self.on_decode_error(message, e),
        };

        let document = &envelope.item_doc;
        let post_type = document
            .get("post_type")
            .map(|v| v.to_string())
            .unwrap_or_else(|| "missing".to_string());
        let post_id = document.post_id().unwrap_or_else(|| "unknown".to_string());

        if !self.filter.should_report(document) {
            info!(
                topic = %message.topic,
                offset = message.offset,
                post_type = %post_type,
                post_id = %post_id,
                "filtered out"
            );
            return DeliveryOutcome::Skipped;
        }

        info!(
            topic = %message.topic,
            offset = message.offset,
            post_type = %post_type,
            post_id = %post_id,
            msg_id = envelope.msg_id.as_deref().unwrap_or(""),
            "filter passed"
        );

        match self.sink.report(document).await {
            ReportOutcome::Delivered => DeliveryOutcome::Delivered,
            ReportOutcome::Failed(failure) => {
                metrics::record_report_failure(failure.category());
                DeliveryOutcome::Failed(FailureCause::Report(failure))
            }
        }
    }

    fn on_decode_error(&self, message: &InboundMessage, e: DecodeError) -> DeliveryOutcome {
        match self.decode_error_policy {
            DecodeErrorPolicy::Retry => {
                error!(
                    topic = %message.topic,
                    offset = message.offset,
                    error = %e,
                    "Message decode failed; withholding commit"
                );
                DeliveryOutcome::Failed(FailureCause::Decode(e))
            }
            DecodeErrorPolicy::Skip => {
                error!(
                    topic = %message.topic,
                    offset = message.offset,
                    error = %e,
                    "Message decode failed; skipping"
                );
                debug!(
                    payload_len = message.payload.as_ref().map_or(0, Vec::len),
                    "Skipped undecodable payload"
                );
                DeliveryOutcome::Skipped
            }
        }
    }
}
