//! Sneaker asset models and DTOs.
//!
//! Only the columns the analysis pipeline reads or writes are modeled
//! here; the wider catalog schema (pricing, collections, wear tracking)
//! belongs to other services.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use soledex_core::types::{DbId, Timestamp};

/// A row from the `assets` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Asset {
    pub id: DbId,
    pub owner_id: DbId,
    pub name: String,
    pub category: String,
    pub image_url: String,
    /// Lifecycle status string; see `soledex_core::status::AssetStatus`.
    pub status: String,
    /// Normalized analysis result (`{brand, model, colorway}` with
    /// per-field confidence), written only by the worker.
    pub ai_metadata: Option<serde_json::Value>,
    pub processed_image_url: Option<String>,
    /// Human-readable reason for the last terminal analysis failure.
    pub analysis_error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for `POST /api/v1/assets`.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateAsset {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 64))]
    pub category: String,
    #[validate(url)]
    pub image_url: String,
}

/// Query parameters for `GET /api/v1/assets`.
#[derive(Debug, Deserialize)]
pub struct AssetListQuery {
    /// Filter by lifecycle status string.
    pub status: Option<String>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}
