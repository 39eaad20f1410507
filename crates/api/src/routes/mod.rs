pub mod assets;
pub mod health;
pub mod jobs;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws                        WebSocket (credential in first frame)
///
/// /assets                    list, create
/// /assets/{id}               get
/// /assets/{id}/analyze       enqueue analysis job (POST)
///
/// /jobs                      list
/// /jobs/{id}                 get
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/assets", assets::router())
        .nest("/jobs", jobs::router())
}
