//! insight-relay - Kafka to ingestion API relay library
//!
//! This library consumes content-analysis documents from Kafka, forwards
//! the eligible ones to an HTTP ingestion API, and commits each offset only
//! after the document has been handled.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `document`: Envelope decoding and the opaque `item_doc` record
//! - `filter`: `post_type` eligibility
//! - `reporter`: HTTP delivery and response classification
//! - `pipeline`: decode, filter and report for one message
//! - `committer`: commit gating and redelivery rewind
//! - `broker`: message bus traits and the Kafka implementation
//! - `supervisor`: connection state machine and consumption loop
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `logging`: tracing subscriber setup
//! - `metrics`: counters and gauges
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use insight_relay::commands::consume::build_supervisor;
//! use insight_relay::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     config.validate()?;
//!
//!     let mut supervisor = build_supervisor(&config)?;
//!     supervisor.run().await;
//!     Ok(())
//! }
//! ```

pub mod broker;
pub mod cli;
pub mod commands;
pub mod committer;
pub mod config;
pub mod document;
pub mod error;
pub mod filter;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod reporter;
pub mod supervisor;

// Re-export commonly used types
pub use config::Config;
pub use document::{Document, Envelope};
pub use error::{RelayError, Result};
pub use pipeline::{DeliveryOutcome, Pipeline};
pub use reporter::{DocumentSink, ReportOutcome, Reporter};
pub use supervisor::{ConnectionState, ConnectionSupervisor, StopHandle};
