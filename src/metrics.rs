//! Relay metrics
//!
//! Counters and gauges recorded through the `metrics` facade. Nothing is
//! exported unless a recorder is installed, see [`init_metrics_exporter`].
//!
//! # Metrics
//!
//! - `insight_messages_total{outcome}`: messages handled, by `skipped`,
//!   `delivered` or `failed`
//! - `insight_report_failures_total{category}`: failed report attempts
//! - `insight_offsets_committed_total`: offsets committed
//! - `insight_offsets_withheld_total`: commits withheld for redelivery
//! - `insight_reconnects_total`: entries into backoff
//! - `insight_connection_state`: current supervisor state
//!
//! # Examples
//!
//! ```
//! use insight_relay::metrics::{record_message_outcome, record_offset_committed};
//!
//! record_message_outcome("delivered");
//! record_offset_committed();
//! ```

use ::metrics::{gauge, increment_counter};

/// Records the outcome of one message.
pub fn record_message_outcome(outcome: &'static str) {
    increment_counter!("insight_messages_total", "outcome" => outcome);
}

/// Records a failed report attempt by category.
pub fn record_report_failure(category: &'static str) {
    increment_counter!("insight_report_failures_total", "category" => category);
}

/// Records a committed offset.
pub fn record_offset_committed() {
    increment_counter!("insight_offsets_committed_total");
}

/// Records a withheld commit.
pub fn record_offset_withheld() {
    increment_counter!("insight_offsets_withheld_total");
}

/// Records a reconnect cycle.
pub fn record_reconnect() {
    increment_counter!("insight_reconnects_total");
}

/// Publishes the supervisor state as a numeric gauge.
pub fn set_connection_state(value: f64) {
    gauge!("insight_connection_state", value);
}

/// Initializes the metrics exporter for Prometheus
///
/// When the `prometheus` feature is enabled, this function sets up the
/// Prometheus exporter on its default listen address. When disabled, it's a
/// no-op that is still safe to call.
///
/// # Examples
///
/// ```
/// use insight_relay::metrics::init_metrics_exporter;
///
/// init_metrics_exporter();
/// ```
pub fn init_metrics_exporter() {
    #[cfg(feature = "prometheus")]
    {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let builder = PrometheusBuilder::new();
        let _ = builder.install().map_err(|e| {
            tracing::warn!("Failed to install Prometheus exporter: {}", e);
        });
    }
}
