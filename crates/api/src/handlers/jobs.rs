//! Handlers for the `/jobs` resource.
//!
//! Read-only: jobs are created through `POST /assets/{id}/analyze` and
//! mutated only by the queue infrastructure.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;

use soledex_core::error::CoreError;
use soledex_core::types::DbId;
use soledex_db::models::job::JobListQuery;
use soledex_db::repositories::JobRepo;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/jobs
///
/// List the caller's analysis jobs with optional status filter and
/// pagination.
pub async fn list_jobs(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<JobListQuery>,
) -> AppResult<impl IntoResponse> {
    let jobs = JobRepo::list_by_owner(&state.pool, auth.owner_id, &params).await?;
    Ok(Json(DataResponse { data: jobs }))
}

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = JobRepo::find_by_id(&state.pool, job_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Job",
            id: job_id,
        }))?;

    if job.owner_id != auth.owner_id {
        return Err(AppError::Core(CoreError::Forbidden(
            "Cannot view another user's job".into(),
        )));
    }

    Ok(Json(DataResponse { data: job }))
}
