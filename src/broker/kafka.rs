//! Kafka connection built on `rdkafka::StreamConsumer`.
//!
//! # Example
//!
//! ```rust,no_run
//! use insight_relay::broker::{BrokerConnection, BrokerConnector, KafkaConnector, PollResult};
//! use insight_relay::broker::config::KafkaConsumerConfig;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = KafkaConsumerConfig::new("localhost:9092", &["test-topic"], "test-group");
//!     let params = config.subscription();
//!     let connector = KafkaConnector::new(config);
//!
//!     let mut connection = connector.connect(&params).await?;
//!     if let PollResult::Messages(batch) = connection.poll(100, Duration::from_secs(5)).await? {
//!         for message in &batch {
//!             connection.commit(message).await?;
//!         }
//!     }
//!     connection.close().await;
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::{Offset, TopicPartitionList};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::config::KafkaConsumerConfig;
use super::{
    BrokerConnection, BrokerConnector, BrokerError, InboundMessage, PollResult, SubscriptionParams,
};

// Once the first message of a batch has arrived, further messages are only
// collected while they are already buffered locally.
const DRAIN_WAIT: Duration = Duration::from_millis(10);

/// Creates Kafka subscriptions.
pub struct KafkaConnector {
    config: KafkaConsumerConfig,
}

impl KafkaConnector {
    /// Creates a connector carrying security and timeout settings.
    pub fn new(config: KafkaConsumerConfig) -> Self {
        Self { config }
    }

    fn client_config(&self, params: &SubscriptionParams) -> ClientConfig {
        let mut client_config = ClientConfig::new();
        for (key, value) in self.config.client_settings(params) {
            client_config.set(key, value);
        }
        client_config
    }
}

#[async_trait]
impl BrokerConnector for KafkaConnector {
    type Connection = KafkaConnection;

    async fn connect(&self, params: &SubscriptionParams) -> Result<KafkaConnection, BrokerError> {
        info!(
            brokers = %params.brokers,
            topics = ?params.topics,
            group_id = %params.group_id,
            security_protocol = %self.config.security_protocol.as_str(),
            "Creating Kafka consumer"
        );

        let consumer: StreamConsumer = self
            .client_config(params)
            .create()
            .map_err(|e| BrokerError::Unavailable(format!("Failed to create consumer: {e}")))?;

        let topics: Vec<&str> = params.topics.iter().map(String::as_str).collect();
        consumer
            .subscribe(&topics)
            .map_err(|e| BrokerError::Unavailable(format!("Failed to subscribe: {e}")))?;

        // Subscribing is lazy; a metadata round trip proves the brokers answer.
        let metadata = consumer
            .fetch_metadata(None, self.config.session_timeout)
            .map_err(|e| BrokerError::Unavailable(format!("Broker metadata request failed: {e}")))?;
        debug!(
            broker_count = metadata.brokers().len(),
            "Broker metadata received"
        );

        Ok(KafkaConnection {
            consumer: Some(consumer),
            rewind_timeout: self.config.session_timeout,
        })
    }
}

/// An open Kafka subscription.
pub struct KafkaConnection {
    consumer: Option<StreamConsumer>,
    rewind_timeout: Duration,
}

impl KafkaConnection {
    fn consumer(&self) -> Result<&StreamConsumer, BrokerError> {
        self.consumer
            .as_ref()
            .ok_or_else(|| BrokerError::Fatal("connection already closed".to_string()))
    }
}

fn to_inbound(message: &BorrowedMessage<'_>) -> InboundMessage {
    InboundMessage {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        payload: message.payload().map(<[u8]>::to_vec),
    }
}

#[async_trait]
impl BrokerConnection for KafkaConnection {
    async fn poll(
        &mut self,
        max_records: usize,
        timeout: Duration,
    ) -> Result<PollResult, BrokerError> {
        let consumer = self.consumer()?;

        let first = match tokio::time::timeout(timeout, consumer.recv()).await {
            Err(_) => return Ok(PollResult::TimedOut),
            Ok(Err(e)) => return Err(BrokerError::Fatal(format!("Error receiving message: {e}"))),
            Ok(Ok(message)) => to_inbound(&message),
        };

        let mut batch = vec![first];
        while batch.len() < max_records {
            match tokio::time::timeout(DRAIN_WAIT, consumer.recv()).await {
                Ok(Ok(message)) => batch.push(to_inbound(&message)),
                Ok(Err(e)) => {
                    // Surfaced again by the next poll if it persists.
                    warn!(error = %e, "Error while draining batch");
                    break;
                }
                Err(_) => break,
            }
        }

        Ok(PollResult::Messages(batch))
    }

    async fn commit(&mut self, message: &InboundMessage) -> Result<(), BrokerError> {
        let consumer = self.consumer()?;

        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            &message.topic,
            message.partition,
            Offset::Offset(message.offset + 1),
        )
        .map_err(|e| BrokerError::Commit(format!("Failed to add partition offset: {e}")))?;

        consumer
            .commit(&tpl, CommitMode::Sync)
            .map_err(|e| BrokerError::Commit(format!("Failed to commit offset: {e}")))
    }

    async fn rewind(&mut self, message: &InboundMessage) -> Result<(), BrokerError> {
        let consumer = self.consumer()?;
        consumer
            .seek(
                &message.topic,
                message.partition,
                Offset::Offset(message.offset),
                self.rewind_timeout,
            )
            .map_err(|e| BrokerError::Commit(format!("Failed to seek partition: {e}")))
    }

    async fn close(&mut self) {
        if let Some(consumer) = self.consumer.take() {
            consumer.unsubscribe();
            drop(consumer);
            info!("Kafka consumer closed");
        }
    }
}
