//! Ingestion pipeline assembly.
//!
//! [`IngestionPipeline::start`] discovers the topic's partitions, opens one
//! cursor per partition and only then spawns the workers, so a startup error
//! never leaves a partial worker set behind. [`IngestionPipeline::shutdown`]
//! stops everything in a fixed order: fire the signal, wait for every worker,
//! close the bus, release the source.

use crate::bus::{BusReceiver, FanInBus};
use crate::monitor::error_feed;
use crate::offsets::OffsetTracker;
use crate::partition::{FinishedWorker, PartitionWorker, WorkerSummary};
use crate::shutdown::{ShutdownCoordinator, ShutdownSignal};
use flow_core::{Error, OffsetCheckpoint, PartitionAssignment, Result};
use kafka::{MessageSource, OffsetStore, StartOffset};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Where workers start reading when the pipeline starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartPosition {
    /// Only messages produced after startup.
    #[default]
    Newest,
    /// Resume from the stored checkpoint, or newest if there is none.
    Committed,
}

impl StartPosition {
    fn resolve(self, committed: Option<i64>) -> StartOffset {
        match (self, committed) {
            (Self::Committed, Some(offset)) => StartOffset::At(offset),
            _ => StartOffset::Newest,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub topic: String,
    pub group: String,
    /// Messages the bus buffers before writers block.
    pub bus_capacity: usize,
    pub start_position: StartPosition,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            topic: "flows".to_string(),
            group: "flow-indexer".to_string(),
            bus_capacity: 256,
            start_position: StartPosition::Newest,
        }
    }
}

/// What [`IngestionPipeline::shutdown`] observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub workers: Vec<WorkerSummary>,
    pub errors_reported: u64,
    pub checkpoints: Vec<OffsetCheckpoint>,
}

impl ShutdownReport {
    pub fn delivered(&self) -> u64 {
        self.workers.iter().map(|w| w.delivered).sum()
    }
}

pub struct IngestionPipeline {
    assignment: PartitionAssignment,
    source: Arc<dyn MessageSource>,
    tracker: OffsetTracker,
    bus: FanInBus,
    coordinator: ShutdownCoordinator,
    workers: Mutex<Vec<JoinHandle<FinishedWorker>>>,
    monitors: Mutex<Vec<JoinHandle<u64>>>,
    report: tokio::sync::Mutex<Option<ShutdownReport>>,
}

impl IngestionPipeline {
    /// Starts one worker and one error monitor per partition.
    ///
    /// Returns the pipeline and the bus's single read endpoint.
    pub async fn start(
        source: Arc<dyn MessageSource>,
        store: Arc<dyn OffsetStore>,
        config: PipelineConfig,
    ) -> Result<(Self, BusReceiver)> {
        let partitions = source.partitions(&config.topic).await?;
        let assignment = PartitionAssignment::new(config.topic.clone(), partitions);

        let tracker = OffsetTracker::new(store, config.group.clone(), config.topic.clone());
        let (bus, rx) = FanInBus::new(config.bus_capacity);
        let coordinator = ShutdownCoordinator::new();

        // Everything that can fail happens before the first spawn.
        let mut workers = Vec::with_capacity(assignment.len());
        for partition in assignment.partitions() {
            let offsets = tracker.manage(partition).await?;
            let start = config.start_position.resolve(offsets.committed_at_start());
            let cursor = source.open(&config.topic, partition, start).await?;
            if cursor.partition() != partition {
                return Err(Error::internal(format!(
                    "cursor for partition {} reports partition {}",
                    partition,
                    cursor.partition()
                )));
            }

            let (feed, monitor) = error_feed(partition);
            let worker = PartitionWorker::new(
                cursor,
                bus.writer(partition)?,
                offsets,
                feed,
                coordinator.signal(),
            );
            workers.push((worker, monitor));
        }

        let mut worker_handles = Vec::with_capacity(workers.len());
        let mut monitor_handles = Vec::with_capacity(workers.len());
        for (worker, monitor) in workers {
            monitor_handles.push(tokio::spawn(monitor.run()));
            worker_handles.push(coordinator.spawn_worker(worker.run()));
        }

        if assignment.is_empty() {
            warn!(topic = %config.topic, "Topic has no partitions, pipeline idle");
        }

        info!(
            topic = %config.topic,
            group = %config.group,
            partitions = assignment.len(),
            bus_capacity = bus.capacity(),
            start = ?config.start_position,
            "Ingestion pipeline started"
        );

        let pipeline = Self {
            assignment,
            source,
            tracker,
            bus,
            coordinator,
            workers: Mutex::new(worker_handles),
            monitors: Mutex::new(monitor_handles),
            report: tokio::sync::Mutex::new(None),
        };

        Ok((pipeline, rx))
    }

    /// Stops the pipeline and waits until it has drained.
    ///
    /// Order: signal, wait for every worker loop, close the bus, release the
    /// source, then flush the final checkpoints.
    ///
    /// Safe to call repeatedly and concurrently; later calls wait for the
    /// first one and return the same report.
    pub async fn shutdown(&self) -> ShutdownReport {
        let mut report = self.report.lock().await;
        if let Some(report) = report.as_ref() {
            return report.clone();
        }

        self.coordinator.fire();
        self.coordinator.wait_all().await;

        let handles = std::mem::take(&mut *self.workers.lock());
        let mut finished = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(worker) => finished.push(worker),
                Err(e) => error!(error = %e, "Partition worker panicked"),
            }
        }

        // The reader sees end-of-stream before any final commit is awaited.
        self.bus.close();

        if let Err(e) = self.source.close().await {
            warn!(error = %e, "Failed to close message source");
        }

        let mut workers = Vec::with_capacity(finished.len());
        for worker in finished {
            workers.push(worker.flush().await);
        }

        let mut errors_reported = 0;
        let monitors = std::mem::take(&mut *self.monitors.lock());
        for monitor in monitors {
            match monitor.await {
                Ok(observed) => errors_reported += observed,
                Err(e) => error!(error = %e, "Error monitor panicked"),
            }
        }

        let finished = ShutdownReport {
            workers,
            errors_reported,
            checkpoints: self.tracker.checkpoints(),
        };

        info!(
            workers = finished.workers.len(),
            delivered = finished.delivered(),
            errors = finished.errors_reported,
            "Ingestion pipeline stopped"
        );

        *report = Some(finished.clone());
        finished
    }

    pub fn assignment(&self) -> &PartitionAssignment {
        &self.assignment
    }

    /// Workers that have not exited yet.
    pub fn active_workers(&self) -> usize {
        self.coordinator.active_workers()
    }

    /// Latest checkpoint marked for `partition`.
    pub fn checkpoint(&self, partition: i32) -> Option<i64> {
        self.tracker.checkpoint(partition)
    }

    pub fn checkpoints(&self) -> Vec<OffsetCheckpoint> {
        self.tracker.checkpoints()
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.coordinator.signal()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.coordinator.is_fired()
    }
}
