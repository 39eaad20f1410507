//! Analysis job models for the durable queue.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use soledex_core::types::{DbId, Timestamp};

/// Queue status of an analysis job.
///
/// Stored as text in `jobs.status`; every literal goes through
/// [`JobStatus::as_str`] so no query carries a magic string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting to be claimed (possibly not yet visible, see `available_at`).
    Pending,
    /// Leased by a worker.
    Running,
    /// Finished successfully.
    Completed,
    /// Failed terminally.
    Failed,
    /// Completed as a no-op because the asset was deleted or reassigned.
    Skipped,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "skipped" => Some(JobStatus::Skipped),
            _ => None,
        }
    }

    /// Terminal statuses never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Skipped
        )
    }
}

/// A row from the `jobs` table.
///
/// The payload columns (`asset_id`, `owner_id`, `image_url`, `category`)
/// are self-sufficient: a worker never trusts them for current entity
/// state and revalidates the asset at consumption time.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    pub asset_id: DbId,
    pub owner_id: DbId,
    pub image_url: String,
    pub category: String,
    pub status: String,
    /// 1-based, incremented atomically at claim time.
    pub attempt_count: i32,
    pub max_attempts: i32,
    /// How many times a stalled lease on this job has been reclaimed.
    pub reclaim_count: i32,
    /// The job is invisible to workers until this instant (backoff).
    pub available_at: Timestamp,
    /// Lease expiry while `running`; `NULL` otherwise.
    pub lease_expires_at: Option<Timestamp>,
    pub last_error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl Job {
    /// Typed view of the text status column.
    pub fn queue_status(&self) -> Option<JobStatus> {
        JobStatus::parse(&self.status)
    }
}

/// Query parameters for `GET /api/v1/jobs`.
#[derive(Debug, Deserialize)]
pub struct JobListQuery {
    /// Filter by status (e.g. `pending`, `failed`).
    pub status: Option<JobStatus>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}
