//! WebSocket infrastructure for real-time push.
//!
//! Provides the owner-scoped room registry, the authenticated upgrade
//! handler, and heartbeat monitoring.

mod handler;
mod heartbeat;
pub mod manager;

pub use handler::ws_handler;
pub use heartbeat::start_heartbeat;
pub use manager::{owner_room, RoomRegistry};
