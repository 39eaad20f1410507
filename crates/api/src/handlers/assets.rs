//! Handlers for the `/assets` resource.
//!
//! All endpoints require authentication via [`AuthUser`] and are scoped
//! to the caller's own assets.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use validator::Validate;

use soledex_core::error::CoreError;
use soledex_core::retry::DEFAULT_MAX_ATTEMPTS;
use soledex_core::types::DbId;
use soledex_db::models::asset::{Asset, AssetListQuery, CreateAsset};
use soledex_db::repositories::{AssetRepo, JobRepo};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Fetch an asset by ID and verify the caller owns it.
///
/// Returns `NotFound` if the asset does not exist, `Forbidden` if the
/// caller is not the owner. `action` is used in the error message
/// (e.g. "view", "analyze").
async fn find_and_authorize(
    pool: &sqlx::PgPool,
    asset_id: DbId,
    auth: &AuthUser,
    action: &str,
) -> AppResult<Asset> {
    let asset = AssetRepo::find_by_id(pool, asset_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Asset",
            id: asset_id,
        }))?;

    if asset.owner_id != auth.owner_id {
        return Err(AppError::Core(CoreError::Forbidden(format!(
            "Cannot {action} another user's asset"
        ))));
    }

    Ok(asset)
}

// ---------------------------------------------------------------------------
// CRUD surface
// ---------------------------------------------------------------------------

/// POST /api/v1/assets
///
/// Create a draft asset. Returns 201 with the created row.
pub async fn create_asset(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<CreateAsset>,
) -> AppResult<impl IntoResponse> {
    input
        .validate()
        .map_err(|e| AppError::Core(CoreError::Validation(e.to_string())))?;

    let asset = AssetRepo::create(&state.pool, auth.owner_id, &input).await?;

    tracing::info!(
        asset_id = asset.id,
        owner_id = auth.owner_id,
        category = %asset.category,
        "Asset created",
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: asset })))
}

/// GET /api/v1/assets
///
/// List the caller's assets with optional status filter and pagination.
pub async fn list_assets(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<AssetListQuery>,
) -> AppResult<impl IntoResponse> {
    let assets = AssetRepo::list_by_owner(&state.pool, auth.owner_id, &params).await?;
    Ok(Json(DataResponse { data: assets }))
}

/// GET /api/v1/assets/{id}
pub async fn get_asset(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(asset_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let asset = find_and_authorize(&state.pool, asset_id, &auth, "view").await?;
    Ok(Json(DataResponse { data: asset }))
}

// ---------------------------------------------------------------------------
// Analysis producer
// ---------------------------------------------------------------------------

/// POST /api/v1/assets/{id}/analyze
///
/// Enqueue an analysis job for the asset and transition it to
/// `processing`. Safe to call again after a failure (the retry path):
/// each call issues a fresh job, independent of prior attempts. Returns
/// 202 with the enqueued job.
pub async fn analyze_asset(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(asset_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let asset = find_and_authorize(&state.pool, asset_id, &auth, "analyze").await?;

    // The producer owns the entry transition; the worker owns the
    // terminal one.
    AssetRepo::mark_processing(&state.pool, asset.id).await?;

    let job = JobRepo::enqueue(
        &state.pool,
        asset.id,
        auth.owner_id,
        &asset.image_url,
        &asset.category,
        DEFAULT_MAX_ATTEMPTS,
    )
    .await?;

    tracing::info!(
        job_id = job.id,
        asset_id = asset.id,
        owner_id = auth.owner_id,
        "Analysis job enqueued",
    );

    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: job })))
}
