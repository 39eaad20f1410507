//! Per-job processing: revalidate, analyze, persist, emit.
//!
//! Within one job the steps are strictly sequential; across jobs there is
//! no ordering guarantee. Ownership and existence races are legitimate
//! outcomes here, not faults: the asset may have been deleted or
//! transferred between enqueue and consumption, in which case the job
//! completes as a skip.

use std::sync::Arc;
use std::time::Duration;

use soledex_analysis::{AnalysisError, AnalysisService};
use soledex_core::retry::{disposition_after_failure, BackoffPolicy, FailureDisposition};
use soledex_core::status::AssetStatus;
use soledex_db::models::job::Job;
use soledex_events::{AssetEvent, EventBus};

use crate::store::{AssetStore, JobStore, StoreError};

/// Lease renewed to this duration right before the slow external call,
/// so it comfortably covers the analysis timeout plus persistence.
const ANALYSIS_LEASE: Duration = Duration::from_secs(120);

/// Why a job completed without touching its asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The asset no longer exists.
    AssetDeleted,
    /// The asset's owner changed since the job was enqueued.
    OwnerChanged,
}

impl SkipReason {
    fn as_str(&self) -> &'static str {
        match self {
            SkipReason::AssetDeleted => "asset deleted before processing",
            SkipReason::OwnerChanged => "asset owner changed since enqueue",
        }
    }
}

/// Terminal result of one processing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Analysis succeeded; asset transitioned and success event emitted.
    Completed,
    /// Retryable failure with attempts remaining; handed back to the queue.
    Rescheduled,
    /// Terminal failure; asset failed and failure event emitted.
    Failed,
    /// Benign race; job completed as a no-op.
    Skipped(SkipReason),
}

/// Everything a worker task needs, constructed once at process start and
/// shared by reference.
pub struct WorkerContext {
    pub assets: Arc<dyn AssetStore>,
    pub jobs: Arc<dyn JobStore>,
    pub analysis: Arc<dyn AnalysisService>,
    pub bus: Arc<EventBus>,
    pub backoff: BackoffPolicy,
}

/// Process one claimed job to a terminal attempt outcome.
///
/// Storage failures bubble up as errors and leave the job leased; the
/// stalled-job reclaimer will eventually redispatch it.
pub async fn process_job(ctx: &WorkerContext, job: &Job) -> Result<ProcessOutcome, StoreError> {
    // 1-2. Revalidate against current state; never trust the payload.
    let asset = match ctx.assets.load(job.asset_id).await? {
        None => return complete_skip(ctx, job, SkipReason::AssetDeleted).await,
        Some(asset) => asset,
    };
    if asset.owner_id != job.owner_id {
        return complete_skip(ctx, job, SkipReason::OwnerChanged).await;
    }

    // 3. The slow call. Heartbeat first so the reclaimer leaves this
    // job alone for the whole analysis window.
    ctx.jobs.extend_lease(job.id, ANALYSIS_LEASE).await?;
    match ctx.analysis.analyze(&job.image_url, &job.category).await {
        Ok(analysis) => {
            // 4. Persist the normalized result and emit the success event.
            ctx.assets
                .apply_analysis(
                    job.asset_id,
                    AssetStatus::Active,
                    &analysis.metadata,
                    analysis.processed_image_url.as_deref(),
                )
                .await?;
            ctx.jobs.complete(job.id).await?;

            let metadata_json = serde_json::to_value(&analysis.metadata)
                .map_err(|e| StoreError(format!("failed to serialize ai metadata: {e}")))?;
            ctx.bus.publish(AssetEvent::success(
                job.asset_id,
                job.owner_id,
                AssetStatus::Active,
                metadata_json,
                analysis.processed_image_url.clone(),
            ));

            tracing::info!(
                job_id = job.id,
                asset_id = job.asset_id,
                owner_id = job.owner_id,
                attempt = job.attempt_count,
                "Analysis completed",
            );
            Ok(ProcessOutcome::Completed)
        }
        Err(err) => handle_failure(ctx, job, err).await,
    }
}

/// Hand a failed attempt to the queue's retry policy, or converge on the
/// terminal-failure path.
async fn handle_failure(
    ctx: &WorkerContext,
    job: &Job,
    err: AnalysisError,
) -> Result<ProcessOutcome, StoreError> {
    let disposition = disposition_after_failure(
        &ctx.backoff,
        job.attempt_count,
        job.max_attempts,
        err.is_retryable(),
    );

    match disposition {
        FailureDisposition::Reschedule(delay) => {
            tracing::warn!(
                job_id = job.id,
                asset_id = job.asset_id,
                attempt = job.attempt_count,
                max_attempts = job.max_attempts,
                delay_secs = delay.as_secs(),
                error = %err,
                "Retryable analysis failure, rescheduling",
            );
            ctx.jobs.retry_later(job.id, delay, &err.to_string()).await?;
            Ok(ProcessOutcome::Rescheduled)
        }
        FailureDisposition::Terminal => {
            tracing::error!(
                job_id = job.id,
                asset_id = job.asset_id,
                attempt = job.attempt_count,
                retryable = err.is_retryable(),
                error = %err,
                "Terminal analysis failure",
            );
            fail_terminally(ctx, job, &err.to_string()).await?;
            Ok(ProcessOutcome::Failed)
        }
    }
}

/// Shared terminal-failure path: asset to `failed`, job closed, failure
/// event emitted. Retry exhaustion and unrecoverable errors both land
/// here.
async fn fail_terminally(ctx: &WorkerContext, job: &Job, reason: &str) -> Result<(), StoreError> {
    ctx.assets.mark_failed(job.asset_id, reason).await?;
    ctx.jobs.fail(job.id, reason).await?;
    ctx.bus
        .publish(AssetEvent::failure(job.asset_id, job.owner_id, reason));
    Ok(())
}

/// Close a job as a no-op skip. Skips never mutate the asset, never emit
/// events, and never retry.
async fn complete_skip(
    ctx: &WorkerContext,
    job: &Job,
    reason: SkipReason,
) -> Result<ProcessOutcome, StoreError> {
    tracing::info!(
        job_id = job.id,
        asset_id = job.asset_id,
        reason = reason.as_str(),
        "Skipping job",
    );
    ctx.jobs.skip(job.id, reason.as_str()).await?;
    Ok(ProcessOutcome::Skipped(reason))
}
