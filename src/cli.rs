//! Command-line interface definition for insight-relay
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands to run the consumer and inspect configuration.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// insight-relay - forwards content-analysis documents from Kafka to the
/// ingestion API
///
/// Offsets are committed only after a document has been accepted
/// downstream (or deliberately filtered out).
#[derive(Parser, Debug, Clone)]
#[command(name = "insight-relay")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for insight-relay
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Consume documents and forward them until interrupted
    Consume {
        /// Topic to subscribe to (repeatable; overrides config)
        #[arg(short, long = "topic")]
        topics: Vec<String>,

        /// Kafka bootstrap servers (overrides config)
        #[arg(short, long)]
        brokers: Option<String>,

        /// Consumer group ID (overrides config)
        #[arg(short, long)]
        group_id: Option<String>,

        /// Force JSON-formatted logs
        #[arg(long)]
        json_logs: bool,

        /// Also append logs to this file
        #[arg(long)]
        log_file: Option<PathBuf>,
    },

    /// Print the effective configuration with secrets masked
    ShowConfig,
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
