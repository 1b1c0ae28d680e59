//! Partition checkpoints.
//!
//! A worker marks the next offset to resume from after each hand-off to the
//! bus. Marking is synchronous and never waits on the store: the value goes
//! into a `watch` channel and a committer task per partition writes the most
//! recent value to the [`OffsetStore`]. A slow store therefore only makes the
//! committed checkpoint lag; consecutive marks coalesce into one commit.

use flow_core::{OffsetCheckpoint, Result};
use kafka::OffsetStore;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use telemetry::metrics;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Checkpoints of every partition managed by this process.
pub struct OffsetTracker {
    store: Arc<dyn OffsetStore>,
    group: String,
    topic: String,
    checkpoints: Mutex<BTreeMap<i32, watch::Receiver<Option<i64>>>>,
}

impl OffsetTracker {
    pub fn new(store: Arc<dyn OffsetStore>, group: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            store,
            group: group.into(),
            topic: topic.into(),
            checkpoints: Mutex::new(BTreeMap::new()),
        }
    }

    /// Starts managing a partition: reads its stored checkpoint and spawns
    /// the committer. Store errors here are fatal to startup.
    pub async fn manage(&self, partition: i32) -> Result<PartitionOffsets> {
        let committed = self
            .store
            .committed(&self.group, &self.topic, partition)
            .await?;

        let (tx, rx) = watch::channel(None);
        self.checkpoints.lock().insert(partition, rx.clone());

        let committer = tokio::spawn(run_committer(
            self.store.clone(),
            self.group.clone(),
            self.topic.clone(),
            partition,
            rx,
        ));

        debug!(partition, committed = ?committed, "Managing partition offsets");

        Ok(PartitionOffsets {
            partition,
            committed,
            tx,
            committer,
        })
    }

    /// Latest checkpoint marked for `partition`, committed or not.
    pub fn checkpoint(&self, partition: i32) -> Option<i64> {
        self.checkpoints
            .lock()
            .get(&partition)
            .and_then(|rx| *rx.borrow())
    }

    /// Marked checkpoints of all partitions that advanced at least once.
    pub fn checkpoints(&self) -> Vec<OffsetCheckpoint> {
        self.checkpoints
            .lock()
            .iter()
            .filter_map(|(&partition, rx)| {
                let offset = (*rx.borrow())?;
                Some(OffsetCheckpoint { partition, offset })
            })
            .collect()
    }
}

/// Checkpoint handle owned by the single worker of one partition.
pub struct PartitionOffsets {
    partition: i32,
    committed: Option<i64>,
    tx: watch::Sender<Option<i64>>,
    committer: JoinHandle<Option<i64>>,
}

impl PartitionOffsets {
    pub fn partition(&self) -> i32 {
        self.partition
    }

    /// Checkpoint found in the store when the partition was first managed.
    pub fn committed_at_start(&self) -> Option<i64> {
        self.committed
    }

    /// Advances the checkpoint to `next_offset`. Never moves backwards and
    /// never waits for the store.
    pub fn mark(&self, next_offset: i64) {
        self.tx.send_if_modified(|current| match *current {
            Some(prev) if prev >= next_offset => false,
            _ => {
                *current = Some(next_offset);
                true
            }
        });
    }

    /// Latest marked checkpoint.
    pub fn current(&self) -> Option<i64> {
        *self.tx.borrow()
    }

    /// Stops the committer after it has written the final checkpoint.
    /// Returns the last offset the store accepted.
    pub async fn close(self) -> Option<i64> {
        let Self {
            partition,
            tx,
            committer,
            ..
        } = self;
        drop(tx);

        match committer.await {
            Ok(committed) => committed,
            Err(e) => {
                error!(partition, error = %e, "Offset committer task failed");
                None
            }
        }
    }
}

async fn run_committer(
    store: Arc<dyn OffsetStore>,
    group: String,
    topic: String,
    partition: i32,
    mut rx: watch::Receiver<Option<i64>>,
) -> Option<i64> {
    let mut last_committed = None;

    // `changed` still yields a value marked just before the sender was dropped.
    while rx.changed().await.is_ok() {
        let marked = *rx.borrow_and_update();
        let Some(offset) = marked else { continue };

        match store.commit(&group, &topic, partition, offset).await {
            Ok(()) => {
                metrics().offsets_committed.inc();
                last_committed = Some(offset);
                debug!(partition, offset, "Committed offset");
            }
            Err(e) => {
                metrics().offset_commit_errors.inc();
                warn!(partition, offset, error = %e, "Offset commit failed");
            }
        }
    }

    last_committed
}
