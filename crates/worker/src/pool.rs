//! Fixed-width pull-based worker pool.
//!
//! Each worker task loops: claim the next visible job, process it, repeat.
//! An empty queue backs off to the poll interval; shutdown is cooperative
//! via `CancellationToken`.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use soledex_core::retry::DEFAULT_LEASE_SECS;

use crate::processor::{process_job, WorkerContext};

/// Default number of concurrent worker tasks.
pub const DEFAULT_WIDTH: usize = 5;

/// Default polling interval when the queue is empty.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Pull-based analysis worker pool.
pub struct WorkerPool {
    width: usize,
    poll_interval: Duration,
    lease: Duration,
}

impl WorkerPool {
    /// Create a pool with the default width of 5.
    pub fn new() -> Self {
        Self::with_width(DEFAULT_WIDTH)
    }

    pub fn with_width(width: usize) -> Self {
        Self {
            width: width.max(1),
            poll_interval: DEFAULT_POLL_INTERVAL,
            lease: Duration::from_secs(DEFAULT_LEASE_SECS),
        }
    }

    /// Override the empty-queue polling interval.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run the pool until the cancellation token is triggered.
    ///
    /// Resolves once every worker task has observed cancellation and
    /// finished its in-flight job.
    pub async fn run(&self, ctx: Arc<WorkerContext>, cancel: CancellationToken) {
        tracing::info!(width = self.width, "Worker pool started");

        let mut handles = Vec::with_capacity(self.width);
        for worker_id in 0..self.width {
            let ctx = Arc::clone(&ctx);
            let cancel = cancel.clone();
            let poll_interval = self.poll_interval;
            let lease = self.lease;
            handles.push(tokio::spawn(async move {
                run_worker(worker_id, ctx, cancel, poll_interval, lease).await;
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
        tracing::info!("Worker pool stopped");
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

/// One worker task's claim/process loop.
async fn run_worker(
    worker_id: usize,
    ctx: Arc<WorkerContext>,
    cancel: CancellationToken,
    poll_interval: Duration,
    lease: Duration,
) {
    loop {
        if cancel.is_cancelled() {
            tracing::debug!(worker_id, "Worker shutting down");
            break;
        }

        match ctx.jobs.claim_next(lease).await {
            Ok(Some(job)) => {
                tracing::debug!(
                    worker_id,
                    job_id = job.id,
                    asset_id = job.asset_id,
                    attempt = job.attempt_count,
                    "Job claimed",
                );
                if let Err(e) = process_job(&ctx, &job).await {
                    // Leave the lease in place; the reclaimer will
                    // redispatch once it expires.
                    tracing::error!(worker_id, job_id = job.id, error = %e, "Job processing failed");
                }
                // Immediately try for the next job.
            }
            Ok(None) => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
            Err(e) => {
                tracing::error!(worker_id, error = %e, "Failed to claim job");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
        }
    }
}
