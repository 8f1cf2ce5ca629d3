//! Connection supervision and the consumption loop.
//!
//! [`ConnectionSupervisor`] owns the broker connection and moves through a
//! fixed set of states:
//!
//! ```text
//! DISCONNECTED -> CONNECTING -> CONSUMING -> BACKOFF -> CONNECTING -> ...
//! ```
//!
//! A failed connect or any connection-level error while consuming sends it
//! to `BACKOFF`, which waits a fixed delay and reconnects with the same
//! subscription parameters. A poll that returns nothing is steady state.
//! Messages are processed strictly one after another; each is decoded,
//! filtered, reported and then settled by the [`OffsetCommitter`] before
//! the next one starts.

use crate::broker::{
    BrokerConnection, BrokerConnector, BrokerError, InboundMessage, PollResult, SubscriptionParams,
};
use crate::committer::{CommitDecision, OffsetCommitter};
use crate::config::Config;
use crate::metrics;
use crate::pipeline::Pipeline;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, Instrument};

/// Supervisor lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection held.
    Disconnected,
    /// Establishing a subscription.
    Connecting,
    /// Polling and processing messages.
    Consuming,
    /// Waiting before reconnecting.
    Backoff,
}

impl ConnectionState {
    /// Numeric value published on the `insight_connection_state` gauge.
    pub fn gauge_value(&self) -> f64 {
        match self {
            Self::Disconnected => 0.0,
            Self::Connecting => 1.0,
            Self::Consuming => 2.0,
            Self::Backoff => 3.0,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Consuming => "CONSUMING",
            Self::Backoff => "BACKOFF",
        };
        f.write_str(name)
    }
}

/// Timing and batching knobs for the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorSettings {
    /// Maximum wait for the next batch.
    pub poll_timeout: Duration,
    /// Maximum messages per batch.
    pub max_poll_records: usize,
    /// Fixed delay before reconnecting.
    pub reconnect_backoff: Duration,
    /// Delay before polling again after a withheld commit.
    pub redelivery_delay: Duration,
}

impl SupervisorSettings {
    /// Extracts the loop settings from the full configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_timeout: Duration::from_secs(config.kafka.poll_timeout_secs),
            max_poll_records: config.kafka.max_poll_records,
            reconnect_backoff: Duration::from_secs(config.supervisor.reconnect_backoff_secs),
            redelivery_delay: Duration::from_secs(config.supervisor.redelivery_delay_secs),
        }
    }
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Requests a supervisor to stop.
///
/// The supervisor finishes the message in hand, closes its connection and
/// returns from [`ConnectionSupervisor::run`]. Polls and backoff waits are
/// interrupted immediately.
#[derive(Debug, Clone)]
pub struct StopHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    fn new() -> (Self, watch::Receiver<bool>) {
        let (sender, receiver) = watch::channel(false);
        (
            Self {
                sender: Arc::new(sender),
            },
            receiver,
        )
    }

    /// Asks the supervisor to stop at the next message boundary.
    pub fn stop(&self) {
        info!("Stopping consumer");
        self.sender.send_replace(true);
    }

    /// Returns true once a stop has been requested.
    pub fn is_stopped(&self) -> bool {
        *self.sender.borrow()
    }
}

/// Owns the broker connection and drives the consumption loop.
pub struct ConnectionSupervisor<C: BrokerConnector> {
    connector: C,
    params: SubscriptionParams,
    pipeline: Pipeline,
    committer: OffsetCommitter,
    settings: SupervisorSettings,
    state: ConnectionState,
    stop: StopHandle,
    stop_signal: watch::Receiver<bool>,
}

impl<C: BrokerConnector> ConnectionSupervisor<C> {
    /// Creates a supervisor in the `DISCONNECTED` state.
    pub fn new(
        connector: C,
        params: SubscriptionParams,
        pipeline: Pipeline,
        settings: SupervisorSettings,
    ) -> Self {
        let (stop, stop_signal) = StopHandle::new();
        Self {
            connector,
            params,
            pipeline,
            committer: OffsetCommitter::new(),
            settings,
            state: ConnectionState::Disconnected,
            stop,
            stop_signal,
        }
    }

    /// Returns a handle that can stop [`run`](Self::run) from another task.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Offset commit counters.
    pub fn committer(&self) -> &OffsetCommitter {
        &self.committer
    }

    /// Runs until a stop is requested. Without one, never returns.
    pub async fn run(&mut self) {
        info!(
            topics = ?self.params.topics,
            group_id = %self.params.group_id,
            brokers = %self.params.brokers,
            filter = %self.pipeline.filter().summary(),
            "Starting consumer"
        );

        while !self.stop.is_stopped() {
            self.transition(ConnectionState::Connecting);

            let mut connection = match self.connector.connect(&self.params).await {
                Ok(connection) => connection,
                Err(e) => {
                    error!(error = %e, "Broker unavailable");
                    self.backoff().await;
                    continue;
                }
            };

            self.transition(ConnectionState::Consuming);
            let result = self.consume(&mut connection).await;
            connection.close().await;

            if let Err(e) = result {
                error!(error = %e, "Consumer error; connection released");
                self.backoff().await;
            }
        }

        self.transition(ConnectionState::Disconnected);
        info!(
            committed = self.committer.committed(),
            withheld = self.committer.withheld(),
            "Consumer stopped"
        );
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state != next {
            info!(from = %self.state, state = %next, "Connection state changed");
        }
        self.state = next;
        metrics::set_connection_state(next.gauge_value());
    }

    async fn backoff(&mut self) {
        self.transition(ConnectionState::Backoff);
        metrics::record_reconnect();
        info!(
            delay_secs = self.settings.reconnect_backoff.as_secs_f64(),
            "Waiting before reconnecting"
        );
        self.pause(self.settings.reconnect_backoff).await;
    }

    // Sleeps unless a stop arrives first.
    async fn pause(&mut self, delay: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = wait_for_stop(&mut self.stop_signal) => {}
        }
    }

    // Returns Ok(()) only when a stop was requested.
    async fn consume(&mut self, connection: &mut C::Connection) -> Result<(), BrokerError> {
        let max_records = self.settings.max_poll_records;
        let poll_timeout = self.settings.poll_timeout;

        while !self.stop.is_stopped() {
            let polled = tokio::select! {
                result = connection.poll(max_records, poll_timeout) => result?,
                _ = wait_for_stop(&mut self.stop_signal) => return Ok(()),
            };

            let batch = match polled {
                PollResult::TimedOut => {
                    debug!("No messages within poll timeout");
                    continue;
                }
                PollResult::Messages(batch) => batch,
            };

            debug!(count = batch.len(), "Received batch");
            if self.handle_batch(connection, batch).await? {
                self.pause(self.settings.redelivery_delay).await;
            }
        }

        Ok(())
    }

    // Returns true if any commit in the batch was withheld.
    async fn handle_batch(
        &mut self,
        connection: &mut C::Connection,
        batch: Vec<InboundMessage>,
    ) -> Result<bool, BrokerError> {
        // Partitions rewound in this batch; their later messages come back
        // on the next poll.
        let mut rewound: HashSet<(String, i32)> = HashSet::new();

        for message in batch {
            if self.stop.is_stopped() {
                break;
            }

            let key = (message.topic.clone(), message.partition);
            if rewound.contains(&key) {
                debug!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    "Deferred behind withheld message"
                );
                continue;
            }

            let span = crate::message_span!(message);
            let outcome = self.pipeline.process(&message).instrument(span.clone()).await;
            let decision = self
                .committer
                .settle(connection, &message, &outcome)
                .instrument(span)
                .await?;

            if decision == CommitDecision::Withheld {
                rewound.insert(key);
            }
        }

        Ok(!rewound.is_empty())
    }
}

async fn wait_for_stop(signal: &mut watch::Receiver<bool>) {
    if signal.wait_for(|stopped| *stopped).await.is_err() {
        // Sender gone; nothing can stop us any more.
        std::future::pending::<()>().await;
    }
}
