//! Route definitions for the `/assets` resource.
//!
//! All endpoints require authentication.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::assets;
use crate::state::AppState;

/// Routes mounted at `/assets`.
///
/// ```text
/// GET    /                -> list_assets
/// POST   /                -> create_asset
/// GET    /{id}            -> get_asset
/// POST   /{id}/analyze    -> analyze_asset
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(assets::list_assets).post(assets::create_asset))
        .route("/{id}", get(assets::get_asset))
        .route("/{id}/analyze", post(assets::analyze_asset))
}
