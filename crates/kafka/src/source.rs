//! Source abstraction consumed by the ingestion pipeline.

use async_trait::async_trait;
use flow_core::{RawMessage, Result};

/// Where a partition cursor starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOffset {
    /// The partition's high watermark: only messages produced from now on.
    Newest,
    /// An explicit offset, typically a stored checkpoint.
    At(i64),
}

/// A partitioned, append-only message log.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Lists the partition ids of `topic`.
    async fn partitions(&self, topic: &str) -> Result<Vec<i32>>;

    /// Opens a cursor over one partition.
    async fn open(
        &self,
        topic: &str,
        partition: i32,
        start: StartOffset,
    ) -> Result<Box<dyn PartitionCursor>>;

    /// Releases the client. Called once, after every cursor has been dropped.
    async fn close(&self) -> Result<()>;
}

/// Sequential reader over a single partition.
#[async_trait]
pub trait PartitionCursor: Send {
    fn partition(&self) -> i32;

    /// Offset of the next message this cursor will yield.
    fn position(&self) -> i64;

    /// Pulls the next message, waiting until one is available.
    ///
    /// `Ok(None)` means the partition can no longer be read. Errors for which
    /// [`flow_core::Error::is_fatal`] is false leave the cursor usable.
    ///
    /// Must be cancel safe: dropping the future before it completes must not
    /// lose a message, since workers race every pull against shutdown.
    async fn next(&mut self) -> Result<Option<RawMessage>>;
}
