use std::sync::Arc;

use crate::config::ServerConfig;
use crate::ws::RoomRegistry;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`). Everything here
/// is constructed exactly once in `main` -- no module-level singletons.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: soledex_db::DbPool,
    /// Server configuration (JWT secret, timeouts, worker width).
    pub config: Arc<ServerConfig>,
    /// WebSocket room registry (owner-scoped rooms).
    pub rooms: Arc<RoomRegistry>,
    /// Event bus between the worker pool and the WebSocket forwarder.
    pub event_bus: Arc<soledex_events::EventBus>,
}
