//! Stop signal and worker barrier.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

/// Read side of the stop signal, handed to every worker.
#[derive(Debug, Clone)]
pub struct ShutdownSignal(CancellationToken);

impl ShutdownSignal {
    /// Resolves once the signal has fired. Cancel safe.
    pub async fn fired(&self) {
        self.0.cancelled().await
    }

    pub fn is_fired(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// One-shot stop signal plus a barrier over the workers spawned through it.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tracker: TaskTracker,
    fired: AtomicBool,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal(self.token.clone())
    }

    /// Fires the signal. Returns `true` only for the call that fired it.
    pub fn fire(&self) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        info!(workers = self.tracker.len(), "Shutdown signal fired");
        self.token.cancel();
        true
    }

    pub fn is_fired(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Spawns a worker that [`wait_all`](Self::wait_all) will wait for.
    pub fn spawn_worker<F>(&self, worker: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(worker)
    }

    /// Workers that have not exited yet.
    pub fn active_workers(&self) -> usize {
        self.tracker.len()
    }

    /// Waits until every spawned worker has exited. No new workers may be
    /// spawned afterwards.
    pub async fn wait_all(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}
