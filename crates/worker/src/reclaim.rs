//! Stalled-job detection and bounded reclamation.
//!
//! A job whose worker died mid-flight keeps its lease until expiry. This
//! task periodically sweeps expired leases: jobs under the reclaim bound
//! go back to `pending` for redispatch; jobs over it are poisoned and
//! take the standard terminal-failure path, which stops a poison job from
//! cycling through the pool forever.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use soledex_core::retry::DEFAULT_MAX_RECLAIMS;
use soledex_events::{AssetEvent, EventBus};

use crate::store::{AssetStore, JobStore, StoreError};

/// How often the reclaimer sweeps for expired leases.
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Periodic stalled-job reclaimer.
pub struct StalledJobReclaimer {
    sweep_interval: Duration,
    max_reclaims: i32,
}

impl StalledJobReclaimer {
    pub fn new() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            max_reclaims: DEFAULT_MAX_RECLAIMS,
        }
    }

    /// Override the sweep interval.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Run the sweep loop until the cancellation token is triggered.
    pub async fn run(
        &self,
        jobs: Arc<dyn JobStore>,
        assets: Arc<dyn AssetStore>,
        bus: Arc<EventBus>,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(self.sweep_interval);
        tracing::info!(
            sweep_interval_secs = self.sweep_interval.as_secs(),
            max_reclaims = self.max_reclaims,
            "Stalled-job reclaimer started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Stalled-job reclaimer shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep(&*jobs, &*assets, &bus).await {
                        tracing::error!(error = %e, "Reclaim sweep failed");
                    }
                }
            }
        }
    }

    /// One sweep: requeue reclaimable jobs, finish off poisoned ones.
    pub async fn sweep(
        &self,
        jobs: &dyn JobStore,
        assets: &dyn AssetStore,
        bus: &EventBus,
    ) -> Result<(), StoreError> {
        let outcome = jobs.reclaim_stalled(self.max_reclaims).await?;

        if outcome.requeued > 0 {
            tracing::warn!(requeued = outcome.requeued, "Reclaimed stalled jobs");
        }

        // Poisoned jobs are already failed in the queue; close out the
        // asset side and tell the owner.
        for job in &outcome.poisoned {
            let reason = job
                .last_error
                .as_deref()
                .unwrap_or("worker lost repeatedly");
            tracing::error!(
                job_id = job.id,
                asset_id = job.asset_id,
                reclaim_count = job.reclaim_count,
                "Poison job failed terminally",
            );
            assets.mark_failed(job.asset_id, reason).await?;
            bus.publish(AssetEvent::failure(job.asset_id, job.owner_id, reason));
        }

        Ok(())
    }
}

impl Default for StalledJobReclaimer {
    fn default() -> Self {
        Self::new()
    }
}
