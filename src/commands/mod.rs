/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint:

- `consume`: run the consumption loop until interrupted
- `show_config`: print the effective configuration with secrets masked

These handlers are intentionally small; the work happens in the library
components (supervisor, pipeline, reporter, broker).
*/

use crate::config::Config;
use crate::error::Result;

/// Consume command
///
/// Wires configuration into a Kafka-backed supervisor and runs it until
/// ctrl-c.
pub mod consume {
    use super::*;
    use crate::broker::{KafkaConnector, KafkaConsumerConfig};
    use crate::filter::PostTypeFilter;
    use crate::logging::init_logging;
    use crate::metrics::init_metrics_exporter;
    use crate::pipeline::Pipeline;
    use crate::reporter::Reporter;
    use crate::supervisor::{ConnectionSupervisor, SupervisorSettings};
    use std::sync::Arc;

    /// Build a supervisor from configuration without connecting.
    ///
    /// # Errors
    ///
    /// Returns an error if the Kafka security settings are invalid or the
    /// HTTP client cannot be created.
    pub fn build_supervisor(config: &Config) -> Result<ConnectionSupervisor<KafkaConnector>> {
        let kafka_config = KafkaConsumerConfig::from_settings(&config.kafka)?;
        let params = kafka_config.subscription();

        let reporter = Reporter::new(config.sink.clone())?;
        if config.sink.api_url.trim().is_empty() || config.sink.sync_token.is_empty() {
            tracing::warn!(
                "INSIGHT_API_URL or INSIGHT_SYNC_TOKEN is not set; eligible documents will not be committed"
            );
        }
        tracing::info!(endpoint = %reporter.endpoint(), "Reporter configured");

        let pipeline = Pipeline::new(
            PostTypeFilter::new(&config.filter),
            Arc::new(reporter),
            config.supervisor.decode_error_policy,
        );

        Ok(ConnectionSupervisor::new(
            KafkaConnector::new(kafka_config),
            params,
            pipeline,
            SupervisorSettings::from_config(config),
        ))
    }

    /// Run the consumer until ctrl-c
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration (consumed)
    pub async fn run_consume(config: Config) -> Result<()> {
        init_logging(&config.logging)?;
        init_metrics_exporter();

        let mut supervisor = build_supervisor(&config)?;
        let stop = supervisor.stop_handle();

        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => stop.stop(),
                Err(e) => tracing::error!("Failed to listen for ctrl-c: {}", e),
            }
        });

        supervisor.run().await;
        Ok(())
    }

}

/// Show-config command
pub mod show_config {
    use super::*;

    /// Render the redacted configuration as YAML.
    pub fn render(config: &Config) -> Result<String> {
        Ok(serde_yaml::to_string(&config.redacted())?)
    }

    /// Print the effective configuration, then validate it
    ///
    /// # Errors
    ///
    /// Returns the validation error after printing, so the process exits
    /// non-zero for an invalid configuration.
    pub fn show_config(config: &Config) -> Result<()> {
        print!("{}", render(config)?);
        config.validate()
    }

}
