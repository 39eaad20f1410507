//! Repository for the `jobs` table -- the durable analysis queue.
//!
//! Visibility model: a job is claimable when `status = 'pending'` and
//! `available_at <= NOW()`. Claiming uses `FOR UPDATE SKIP LOCKED` so a
//! job is leased by at most one worker at a time even with many pool
//! members polling concurrently. `attempt_count` is incremented at claim
//! time: a worker that dies mid-flight still burns the attempt.

use std::time::Duration;

use sqlx::PgPool;

use soledex_core::types::DbId;

use crate::models::job::{Job, JobListQuery, JobStatus};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, asset_id, owner_id, image_url, category, status, \
    attempt_count, max_attempts, reclaim_count, \
    available_at, lease_expires_at, last_error, \
    created_at, updated_at, completed_at";

/// Maximum page size for job listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for job listing.
const DEFAULT_LIMIT: i64 = 50;

/// Jobs reclaimed and poisoned in one stalled-job sweep.
#[derive(Debug, Default)]
pub struct ReclaimOutcome {
    /// Jobs whose expired lease was returned to `pending` for redispatch.
    pub requeued: u64,
    /// Jobs over the reclaim bound, moved to `failed`. The caller owns the
    /// rest of the terminal-failure path (asset transition + event).
    pub poisoned: Vec<Job>,
}

/// Provides queue operations for analysis jobs.
pub struct JobRepo;

impl JobRepo {
    /// Persist a new pending job.
    ///
    /// Safe to call again for the same asset (the retry path): every call
    /// issues a fresh row with a new id, independent of prior attempts.
    /// If the backing store is unavailable the error surfaces synchronously
    /// and no job is persisted.
    pub async fn enqueue(
        pool: &PgPool,
        asset_id: DbId,
        owner_id: DbId,
        image_url: &str,
        category: &str,
        max_attempts: i32,
    ) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs \
                 (asset_id, owner_id, image_url, category, status, max_attempts) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(asset_id)
            .bind(owner_id)
            .bind(image_url)
            .bind(category)
            .bind(JobStatus::Pending.as_str())
            .bind(max_attempts)
            .fetch_one(pool)
            .await
    }

    /// Atomically claim the next visible pending job.
    ///
    /// Sets the lease, increments `attempt_count`, and moves the job to
    /// `running`. Uses `FOR UPDATE SKIP LOCKED` to prevent double-dispatch
    /// across concurrent workers.
    pub async fn claim_next(pool: &PgPool, lease: Duration) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET status = $1, \
                 attempt_count = attempt_count + 1, \
                 lease_expires_at = NOW() + make_interval(secs => $2), \
                 updated_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM jobs \
                 WHERE status = $3 AND available_at <= NOW() \
                 ORDER BY available_at ASC, id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(JobStatus::Running.as_str())
            .bind(lease.as_secs_f64())
            .bind(JobStatus::Pending.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Extend the lease of a running job (worker heartbeat).
    pub async fn extend_lease(
        pool: &PgPool,
        job_id: DbId,
        lease: Duration,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE jobs \
             SET lease_expires_at = NOW() + make_interval(secs => $2), updated_at = NOW() \
             WHERE id = $1 AND status = $3",
        )
        .bind(job_id)
        .bind(lease.as_secs_f64())
        .bind(JobStatus::Running.as_str())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Return a failed attempt to `pending`, visible again after `delay`.
    ///
    /// This is the queue's backoff mechanism; the worker decides the delay
    /// via `soledex_core::retry` and never loops on its own.
    pub async fn retry_later(
        pool: &PgPool,
        job_id: DbId,
        delay: Duration,
        error: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE jobs \
             SET status = $2, \
                 available_at = NOW() + make_interval(secs => $3), \
                 lease_expires_at = NULL, \
                 last_error = $4, \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(JobStatus::Pending.as_str())
        .bind(delay.as_secs_f64())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Mark a job as completed successfully.
    pub async fn complete(pool: &PgPool, job_id: DbId) -> Result<(), sqlx::Error> {
        Self::finish(pool, job_id, JobStatus::Completed, None).await
    }

    /// Mark a job as terminally failed with an error message.
    pub async fn fail(pool: &PgPool, job_id: DbId, error: &str) -> Result<(), sqlx::Error> {
        Self::finish(pool, job_id, JobStatus::Failed, Some(error)).await
    }

    /// Complete a job as a no-op skip (asset deleted or reassigned).
    ///
    /// A skip is not a failure: it records the reason and never retries.
    pub async fn skip(pool: &PgPool, job_id: DbId, reason: &str) -> Result<(), sqlx::Error> {
        Self::finish(pool, job_id, JobStatus::Skipped, Some(reason)).await
    }

    /// Shared terminal transition.
    async fn finish(
        pool: &PgPool,
        job_id: DbId,
        status: JobStatus,
        note: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE jobs \
             SET status = $2, \
                 last_error = COALESCE($3, last_error), \
                 lease_expires_at = NULL, \
                 completed_at = NOW(), \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(status.as_str())
        .bind(note)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Sweep stalled jobs: running jobs whose lease has expired.
    ///
    /// Jobs under the reclaim bound return to `pending` immediately with
    /// `reclaim_count` incremented; jobs at or over the bound are poisoned
    /// (failed) and returned so the caller can finish the terminal-failure
    /// path for their assets.
    pub async fn reclaim_stalled(
        pool: &PgPool,
        max_reclaims: i32,
    ) -> Result<ReclaimOutcome, sqlx::Error> {
        let poison_query = format!(
            "UPDATE jobs \
             SET status = $1, \
                 last_error = 'worker lost repeatedly', \
                 lease_expires_at = NULL, \
                 completed_at = NOW(), \
                 updated_at = NOW() \
             WHERE status = $2 \
               AND lease_expires_at IS NOT NULL \
               AND lease_expires_at < NOW() \
               AND reclaim_count >= $3 \
             RETURNING {COLUMNS}"
        );
        let poisoned = sqlx::query_as::<_, Job>(&poison_query)
            .bind(JobStatus::Failed.as_str())
            .bind(JobStatus::Running.as_str())
            .bind(max_reclaims)
            .fetch_all(pool)
            .await?;

        let requeued = sqlx::query(
            "UPDATE jobs \
             SET status = $1, \
                 reclaim_count = reclaim_count + 1, \
                 lease_expires_at = NULL, \
                 available_at = NOW(), \
                 updated_at = NOW() \
             WHERE status = $2 \
               AND lease_expires_at IS NOT NULL \
               AND lease_expires_at < NOW() \
               AND reclaim_count < $3",
        )
        .bind(JobStatus::Pending.as_str())
        .bind(JobStatus::Running.as_str())
        .bind(max_reclaims)
        .execute(pool)
        .await?
        .rows_affected();

        Ok(ReclaimOutcome { requeued, poisoned })
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List jobs for one owner with optional status filter and pagination.
    pub async fn list_by_owner(
        pool: &PgPool,
        owner_id: DbId,
        params: &JobListQuery,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = params.offset.unwrap_or(0);

        let query = if params.status.is_some() {
            format!(
                "SELECT {COLUMNS} FROM jobs \
                 WHERE owner_id = $1 AND status = $2 \
                 ORDER BY created_at DESC \
                 LIMIT $3 OFFSET $4"
            )
        } else {
            format!(
                "SELECT {COLUMNS} FROM jobs \
                 WHERE owner_id = $1 \
                 ORDER BY created_at DESC \
                 LIMIT $2 OFFSET $3"
            )
        };

        let mut q = sqlx::query_as::<_, Job>(&query).bind(owner_id);
        if let Some(status) = params.status {
            q = q.bind(status.as_str());
        }
        q.bind(limit).bind(offset).fetch_all(pool).await
    }
}
