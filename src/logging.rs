//! Structured logging setup
//!
//! Provides JSON-formatted and human-readable logging with optional file
//! output. Field names used across the relay (`topic`, `partition`,
//! `offset`, `post_type`, `post_id`, `origin_id`, `status`, `category`,
//! `state`) are relied on by external dashboards and must not be renamed.

use crate::config::LoggingConfig;
use crate::error::Result;
use std::fs::OpenOptions;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging based on configuration.
///
/// `RUST_LOG` takes precedence over the configured level.
///
/// # Errors
///
/// Returns an error if the level is not a valid filter, the log file cannot
/// be opened, or a global subscriber is already installed.
///
/// # Examples
///
/// ```no_run
/// use insight_relay::config::LoggingConfig;
/// use insight_relay::logging::init_logging;
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     json_format: true,
///     file_path: None,
/// };
///
/// init_logging(&config).unwrap();
/// ```
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    let registry = tracing_subscriber::registry().with(env_filter);

    let file = match &config.file_path {
        Some(path) => Some(Arc::new(
            OpenOptions::new().create(true).append(true).open(path)?,
        )),
        None => None,
    };

    if config.json_format {
        let stdout_layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true);

        let file_layer = file.map(|file| {
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_writer(file)
        });

        registry.with(stdout_layer).with(file_layer).try_init()?;
    } else {
        let stdout_layer = fmt::layer().with_target(true).with_level(true);

        let file_layer = file.map(|file| {
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_ansi(false)
                .with_writer(file)
        });

        registry.with(stdout_layer).with(file_layer).try_init()?;
    }

    Ok(())
}

/// Create the span every inbound message is processed in.
///
/// # Examples
///
/// ```
/// use insight_relay::broker::InboundMessage;
///
/// let message = InboundMessage::new("test-topic", 0, 7, b"{}".to_vec());
/// let span = insight_relay::message_span!(message);
/// let _guard = span.enter();
/// ```
#[macro_export]
macro_rules! message_span {
    ($message:expr) => {
        tracing::info_span!(
            "message",
            topic = %$message.topic,
            partition = $message.partition,
            offset = $message.offset
        )
    };
}
