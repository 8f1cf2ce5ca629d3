//! Message bus abstraction
//!
//! The supervisor drives a connection through two seams:
//!
//! - [`BrokerConnector`] establishes a subscription from [`SubscriptionParams`]
//! - [`BrokerConnection`] polls batches, commits single offsets, rewinds a
//!   partition for redelivery, and is explicitly closed on every exit
//!
//! The Kafka implementation lives in [`kafka`]; tests substitute scripted
//! fakes.

pub mod config;
pub mod kafka;

pub use config::{
    ConfigError, KafkaConsumerConfig, SaslConfig, SaslMechanism, SecurityProtocol, SslConfig,
};
pub use kafka::{KafkaConnection, KafkaConnector};

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Connection-level failures. Every variant sends the supervisor to backoff.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The broker could not be reached or the subscription could not be set up.
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    /// A transport or protocol error while consuming.
    #[error("consumer fatal error: {0}")]
    Fatal(String),

    /// A commit or rewind was not acknowledged.
    #[error("offset commit failed: {0}")]
    Commit(String),
}

/// A single record read from the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Source topic
    pub topic: String,
    /// Source partition
    pub partition: i32,
    /// Broker-assigned offset; treated as an opaque commit token
    pub offset: i64,
    /// Raw message value (if any)
    pub payload: Option<Vec<u8>>,
}

impl InboundMessage {
    /// Creates a message carrying `payload`.
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            payload: Some(payload),
        }
    }
}

/// Result of one bounded poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResult {
    /// At least one message arrived.
    Messages(Vec<InboundMessage>),
    /// Nothing arrived within the poll timeout. Not an error.
    TimedOut,
}

/// Parameters identifying a subscription.
///
/// The supervisor reuses the same value for every reconnect attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionParams {
    /// Bootstrap servers (comma-separated)
    pub brokers: String,
    /// Topics to subscribe to
    pub topics: Vec<String>,
    /// Consumer group ID
    pub group_id: String,
    /// Start position for a group with no committed offsets
    pub auto_offset_reset: String,
    /// Always false: offsets are committed only after successful handling
    pub enable_auto_commit: bool,
}

/// An established subscription.
#[async_trait]
pub trait BrokerConnection: Send {
    /// Waits up to `timeout` for the next batch of at most `max_records`.
    async fn poll(
        &mut self,
        max_records: usize,
        timeout: Duration,
    ) -> Result<PollResult, BrokerError>;

    /// Durably commits the position just past `message`. Blocks until acknowledged.
    async fn commit(&mut self, message: &InboundMessage) -> Result<(), BrokerError>;

    /// Moves the fetch position of `message`'s partition back to `message`,
    /// so it is presented again by a later poll.
    async fn rewind(&mut self, message: &InboundMessage) -> Result<(), BrokerError>;

    /// Releases the connection. Safe to call more than once.
    async fn close(&mut self);
}

/// Factory for [`BrokerConnection`]s.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Connection type produced by this connector.
    type Connection: BrokerConnection;

    /// Establishes a subscription.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Unavailable`] when the broker cannot be reached.
    async fn connect(&self, params: &SubscriptionParams) -> Result<Self::Connection, BrokerError>;
}
