//! Repository for the `assets` table (pipeline-relevant operations).
//!
//! Status transitions written here follow the monotonic machine in
//! `soledex_core::status`: the producer sets `processing` at enqueue time
//! and the worker writes exactly one terminal transition per pass. No
//! other writer touches `status` while a job is in flight; the worker
//! revalidates ownership at consumption time instead of taking a lock.

use sqlx::PgPool;

use soledex_core::status::AssetStatus;
use soledex_core::types::DbId;

use crate::models::asset::{Asset, AssetListQuery, CreateAsset};

/// Column list for `assets` queries.
const COLUMNS: &str = "\
    id, owner_id, name, category, image_url, status, \
    ai_metadata, processed_image_url, analysis_error, \
    created_at, updated_at";

/// Maximum page size for asset listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for asset listing.
const DEFAULT_LIMIT: i64 = 50;

/// Provides persistence operations for sneaker assets.
pub struct AssetRepo;

impl AssetRepo {
    /// Insert a new draft asset for an owner.
    pub async fn create(
        pool: &PgPool,
        owner_id: DbId,
        input: &CreateAsset,
    ) -> Result<Asset, sqlx::Error> {
        let query = format!(
            "INSERT INTO assets (owner_id, name, category, image_url, status) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Asset>(&query)
            .bind(owner_id)
            .bind(&input.name)
            .bind(&input.category)
            .bind(&input.image_url)
            .bind(AssetStatus::Draft.as_str())
            .fetch_one(pool)
            .await
    }

    /// Find an asset by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Asset>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM assets WHERE id = $1");
        sqlx::query_as::<_, Asset>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Producer-side transition into `processing`, clearing any stale
    /// failure reason from a previous pass.
    pub async fn mark_processing(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE assets \
             SET status = $2, analysis_error = NULL, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(AssetStatus::Processing.as_str())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Worker-side success transition: persist the normalized analysis
    /// result and move to `active` (or `partial`).
    pub async fn apply_analysis(
        pool: &PgPool,
        id: DbId,
        status: AssetStatus,
        ai_metadata: &serde_json::Value,
        processed_image_url: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE assets \
             SET status = $2, \
                 ai_metadata = $3, \
                 processed_image_url = COALESCE($4, processed_image_url), \
                 analysis_error = NULL, \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(ai_metadata)
        .bind(processed_image_url)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Worker-side terminal failure transition with the persisted reason.
    pub async fn mark_failed(pool: &PgPool, id: DbId, reason: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE assets \
             SET status = $2, analysis_error = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(AssetStatus::Failed.as_str())
        .bind(reason)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// List one owner's assets with optional status filter and pagination.
    pub async fn list_by_owner(
        pool: &PgPool,
        owner_id: DbId,
        params: &AssetListQuery,
    ) -> Result<Vec<Asset>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = params.offset.unwrap_or(0);

        let query = if params.status.is_some() {
            format!(
                "SELECT {COLUMNS} FROM assets \
                 WHERE owner_id = $1 AND status = $2 \
                 ORDER BY created_at DESC \
                 LIMIT $3 OFFSET $4"
            )
        } else {
            format!(
                "SELECT {COLUMNS} FROM assets \
                 WHERE owner_id = $1 \
                 ORDER BY created_at DESC \
                 LIMIT $2 OFFSET $3"
            )
        };

        let mut q = sqlx::query_as::<_, Asset>(&query).bind(owner_id);
        if let Some(status) = &params.status {
            q = q.bind(status.as_str());
        }
        q.bind(limit).bind(offset).fetch_all(pool).await
    }
}
