//! Offset commit gating.
//!
//! A message's offset is committed if and only if its pipeline outcome is a
//! success. On failure the commit is withheld and the partition is rewound
//! to the failed message so the open connection presents it again.

use crate::broker::{BrokerConnection, BrokerError, InboundMessage};
use crate::metrics;
use crate::pipeline::DeliveryOutcome;
use tracing::{info, warn};

/// What happened to a message's offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitDecision {
    /// The position past the message was committed.
    Committed,
    /// Nothing was committed; the message will be redelivered.
    Withheld,
}

/// Commits or withholds offsets one message at a time.
#[derive(Debug, Default)]
pub struct OffsetCommitter {
    committed: u64,
    withheld: u64,
}

impl OffsetCommitter {
    /// Creates a committer with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Settles one message against its outcome.
    ///
    /// Blocks until the broker acknowledges the commit or rewind.
    ///
    /// # Errors
    ///
    /// Returns the broker error if the commit or rewind fails; the caller
    /// must treat it as a connection-level fault.
    pub async fn settle<C>(
        &mut self,
        connection: &mut C,
        message: &InboundMessage,
        outcome: &DeliveryOutcome,
    ) -> Result<CommitDecision, BrokerError>
    where
        C: BrokerConnection + ?Sized,
    {
        let DeliveryOutcome::Failed(cause) = outcome else {
            connection.commit(message).await?;
            self.committed += 1;
            metrics::record_offset_committed();
            info!(
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                outcome = outcome.label(),
                "Offset committed"
            );
            return Ok(CommitDecision::Committed);
        };

        connection.rewind(message).await?;
        self.withheld += 1;
        metrics::record_offset_withheld();
        warn!(
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            cause = %cause,
            "Commit withheld; message will be redelivered"
        );
        Ok(CommitDecision::Withheld)
    }

    /// Number of offsets committed so far.
    pub fn committed(&self) -> u64 {
        self.committed
    }

    /// Number of commits withheld so far.
    pub fn withheld(&self) -> u64 {
        self.withheld
    }
}
