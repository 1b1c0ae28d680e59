//! Per-partition error monitoring.
//!
//! Each worker reports through an [`ErrorFeed`]. The paired [`ErrorMonitor`]
//! turns reports into log events and metrics, and ends once the worker has
//! dropped its feed. Reporting never blocks and never stops the worker.

use flow_core::{Error, WorkerError};
use telemetry::metrics;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Creates the feed of one partition and the monitor draining it.
pub fn error_feed(partition: i32) -> (ErrorFeed, ErrorMonitor) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ErrorFeed { partition, tx },
        ErrorMonitor { partition, rx },
    )
}

/// Write side of a worker's error feed.
#[derive(Debug, Clone)]
pub struct ErrorFeed {
    partition: i32,
    tx: mpsc::UnboundedSender<WorkerError>,
}

impl ErrorFeed {
    pub fn report(&self, err: &Error) {
        self.send(WorkerError::from_error(self.partition, err));
    }

    pub fn send(&self, err: WorkerError) {
        // The monitor outlives its worker; a send can only fail during teardown.
        let _ = self.tx.send(err);
    }
}

/// Drains one worker's error feed.
#[derive(Debug)]
pub struct ErrorMonitor {
    partition: i32,
    rx: mpsc::UnboundedReceiver<WorkerError>,
}

impl ErrorMonitor {
    pub fn partition(&self) -> i32 {
        self.partition
    }

    /// Runs until the feed closes. Returns the number of errors observed.
    pub async fn run(mut self) -> u64 {
        let mut observed = 0;

        while let Some(err) = self.rx.recv().await {
            observed += 1;
            metrics().worker_errors.inc();

            if err.fatal {
                error!(
                    partition = err.partition,
                    at = %err.timestamp,
                    "Partition worker failed: {}",
                    err.detail
                );
            } else {
                warn!(
                    partition = err.partition,
                    at = %err.timestamp,
                    "Partition worker error: {}",
                    err.detail
                );
            }
        }

        debug!(partition = self.partition, observed, "Error monitor stopped");
        observed
    }
}
