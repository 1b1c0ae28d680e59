//! Partition worker: the consumption loop of one partition.
//!
//! Pull a message, hand it to the bus, then mark the checkpoint past it. Only
//! the pull races against shutdown; a message already pulled is always handed
//! to the bus before the worker looks at the signal again.

use crate::bus::BusSender;
use crate::monitor::ErrorFeed;
use crate::offsets::PartitionOffsets;
use crate::shutdown::ShutdownSignal;
use flow_core::Error;
use kafka::PartitionCursor;
use telemetry::metrics;
use tracing::{debug, info, warn};

/// Why a worker left its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The shutdown signal fired.
    Shutdown,
    /// The cursor ended on its own.
    SourceClosed,
    /// The cursor reported a fatal error.
    Failed,
    /// The bus reader went away.
    BusClosed,
}

/// Outcome of one worker run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSummary {
    pub partition: i32,
    pub delivered: u64,
    pub exit: WorkerExit,
    /// Last checkpoint marked by the worker.
    pub checkpoint: Option<i64>,
    /// Last checkpoint the offset store accepted. Known after the flush.
    pub committed: Option<i64>,
}

/// A worker that left its loop but whose committer may still be writing.
pub struct FinishedWorker {
    summary: WorkerSummary,
    offsets: PartitionOffsets,
}

impl FinishedWorker {
    pub fn partition(&self) -> i32 {
        self.summary.partition
    }

    pub fn exit(&self) -> WorkerExit {
        self.summary.exit
    }

    /// Waits for the final checkpoint to reach the offset store.
    pub async fn flush(self) -> WorkerSummary {
        let Self {
            mut summary,
            offsets,
        } = self;
        summary.committed = offsets.close().await;
        debug!(
            partition = summary.partition,
            committed = ?summary.committed,
            "Final checkpoint flushed"
        );
        summary
    }
}

pub struct PartitionWorker {
    partition: i32,
    cursor: Box<dyn PartitionCursor>,
    bus: BusSender,
    offsets: PartitionOffsets,
    errors: ErrorFeed,
    shutdown: ShutdownSignal,
}

impl PartitionWorker {
    pub fn new(
        cursor: Box<dyn PartitionCursor>,
        bus: BusSender,
        offsets: PartitionOffsets,
        errors: ErrorFeed,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            partition: cursor.partition(),
            cursor,
            bus,
            offsets,
            errors,
            shutdown,
        }
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    /// Runs until shutdown or until the partition can no longer be read.
    ///
    /// Returns as soon as the loop ends with the bus writer and cursor
    /// released. The final commit is left to [`FinishedWorker::flush`].
    pub async fn run(self) -> FinishedWorker {
        let Self {
            partition,
            mut cursor,
            bus,
            offsets,
            errors,
            shutdown,
        } = self;

        metrics().partitions_active.inc();
        info!(partition, position = cursor.position(), "Partition worker started");

        let mut delivered = 0u64;

        let exit = loop {
            let pulled = tokio::select! {
                biased;
                _ = shutdown.fired() => break WorkerExit::Shutdown,
                pulled = cursor.next() => pulled,
            };

            match pulled {
                Ok(Some(msg)) => {
                    metrics().messages_consumed.inc();
                    let offset = msg.offset;
                    let next = msg.next_offset();

                    if bus.send(msg).await.is_err() {
                        warn!(partition, offset, "Bus reader gone, dropping in-flight message");
                        break WorkerExit::BusClosed;
                    }

                    offsets.mark(next);
                    delivered += 1;
                    metrics().messages_delivered.inc();
                }
                Ok(None) if shutdown.is_fired() => break WorkerExit::Shutdown,
                Ok(None) => {
                    errors.report(&Error::SourceClosed(partition));
                    break WorkerExit::SourceClosed;
                }
                Err(e) if e.is_fatal() => {
                    errors.report(&e);
                    break WorkerExit::Failed;
                }
                Err(e) => {
                    debug!(partition, error = %e, "Transient source error");
                    errors.report(&e);
                }
            }
        };

        drop(bus);
        drop(cursor);

        let checkpoint = offsets.current();
        metrics().partitions_active.dec();

        info!(
            partition,
            delivered,
            exit = ?exit,
            checkpoint = ?checkpoint,
            "Partition worker stopped"
        );

        FinishedWorker {
            summary: WorkerSummary {
                partition,
                delivered,
                exit,
                checkpoint,
                committed: None,
            },
            offsets,
        }
    }
}
