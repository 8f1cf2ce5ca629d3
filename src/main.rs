//! insight-relay
//!
#![doc = "insight-relay - Kafka to ingestion API relay"]
#![doc = "Main entry point for the insight-relay consumer."]

use anyhow::Result;

use insight_relay::cli::{Cli, Commands};
use insight_relay::commands;
use insight_relay::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Execute command
    match cli.command {
        Commands::Consume { .. } => {
            config.validate()?;
            commands::consume::run_consume(config).await
        }
        Commands::ShowConfig => commands::show_config::show_config(&config),
    }
}
