//! Persistence seams for the worker.
//!
//! The processor talks to storage through [`AssetStore`] and [`JobStore`]
//! so its race handling and failure classification can be exercised with
//! in-memory stores. Production wires in the Postgres-backed
//! implementations below, which delegate to the `soledex-db` repositories.

use std::time::Duration;

use async_trait::async_trait;

use soledex_analysis::AiMetadata;
use soledex_core::status::AssetStatus;
use soledex_core::types::DbId;
use soledex_db::models::job::Job;
use soledex_db::repositories::{AssetRepo, JobRepo, ReclaimOutcome};
use soledex_db::DbPool;

/// Storage-layer failure, opaque to the processor's control flow.
#[derive(Debug, thiserror::Error)]
#[error("store error: {0}")]
pub struct StoreError(pub String);

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError(e.to_string())
    }
}

/// The slice of an asset the worker needs for revalidation.
#[derive(Debug, Clone)]
pub struct AssetSnapshot {
    pub id: DbId,
    pub owner_id: DbId,
    pub status: AssetStatus,
}

/// Asset persistence as the worker sees it.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Load the current asset state. `None` means deleted.
    async fn load(&self, id: DbId) -> Result<Option<AssetSnapshot>, StoreError>;

    /// Persist a successful analysis and transition to `status`.
    async fn apply_analysis(
        &self,
        id: DbId,
        status: AssetStatus,
        metadata: &AiMetadata,
        processed_image_url: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Transition to `failed` with the persisted reason.
    async fn mark_failed(&self, id: DbId, reason: &str) -> Result<(), StoreError>;
}

/// Queue operations as the worker sees it.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Claim the next visible pending job under a lease.
    async fn claim_next(&self, lease: Duration) -> Result<Option<Job>, StoreError>;

    /// Renew a running job's lease (worker heartbeat).
    async fn extend_lease(&self, job_id: DbId, lease: Duration) -> Result<(), StoreError>;

    /// Reschedule a failed attempt to become visible after `delay`.
    async fn retry_later(&self, job_id: DbId, delay: Duration, error: &str)
        -> Result<(), StoreError>;

    async fn complete(&self, job_id: DbId) -> Result<(), StoreError>;

    async fn fail(&self, job_id: DbId, error: &str) -> Result<(), StoreError>;

    async fn skip(&self, job_id: DbId, reason: &str) -> Result<(), StoreError>;

    /// Sweep expired leases; see [`JobRepo::reclaim_stalled`].
    async fn reclaim_stalled(&self, max_reclaims: i32) -> Result<ReclaimOutcome, StoreError>;
}

// ---------------------------------------------------------------------------
// Postgres implementations
// ---------------------------------------------------------------------------

/// [`AssetStore`] backed by the `assets` table.
pub struct PgAssetStore {
    pool: DbPool,
}

impl PgAssetStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssetStore for PgAssetStore {
    async fn load(&self, id: DbId) -> Result<Option<AssetSnapshot>, StoreError> {
        let asset = AssetRepo::find_by_id(&self.pool, id).await?;
        Ok(asset.map(|a| AssetSnapshot {
            id: a.id,
            owner_id: a.owner_id,
            status: AssetStatus::parse(&a.status).unwrap_or(AssetStatus::Processing),
        }))
    }

    async fn apply_analysis(
        &self,
        id: DbId,
        status: AssetStatus,
        metadata: &AiMetadata,
        processed_image_url: Option<&str>,
    ) -> Result<(), StoreError> {
        let metadata_json = serde_json::to_value(metadata)
            .map_err(|e| StoreError(format!("failed to serialize ai metadata: {e}")))?;
        AssetRepo::apply_analysis(&self.pool, id, status, &metadata_json, processed_image_url)
            .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: DbId, reason: &str) -> Result<(), StoreError> {
        AssetRepo::mark_failed(&self.pool, id, reason).await?;
        Ok(())
    }
}

/// [`JobStore`] backed by the `jobs` table.
pub struct PgJobStore {
    pool: DbPool,
}

impl PgJobStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn claim_next(&self, lease: Duration) -> Result<Option<Job>, StoreError> {
        Ok(JobRepo::claim_next(&self.pool, lease).await?)
    }

    async fn extend_lease(&self, job_id: DbId, lease: Duration) -> Result<(), StoreError> {
        Ok(JobRepo::extend_lease(&self.pool, job_id, lease).await?)
    }

    async fn retry_later(
        &self,
        job_id: DbId,
        delay: Duration,
        error: &str,
    ) -> Result<(), StoreError> {
        Ok(JobRepo::retry_later(&self.pool, job_id, delay, error).await?)
    }

    async fn complete(&self, job_id: DbId) -> Result<(), StoreError> {
        Ok(JobRepo::complete(&self.pool, job_id).await?)
    }

    async fn fail(&self, job_id: DbId, error: &str) -> Result<(), StoreError> {
        Ok(JobRepo::fail(&self.pool, job_id, error).await?)
    }

    async fn skip(&self, job_id: DbId, reason: &str) -> Result<(), StoreError> {
        Ok(JobRepo::skip(&self.pool, job_id, reason).await?)
    }

    async fn reclaim_stalled(&self, max_reclaims: i32) -> Result<ReclaimOutcome, StoreError> {
        Ok(JobRepo::reclaim_stalled(&self.pool, max_reclaims).await?)
    }
}
