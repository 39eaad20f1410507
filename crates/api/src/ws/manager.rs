//! Owner-scoped room registry for WebSocket connections.
//!
//! Every authenticated connection joins exactly one room named
//! `owner:<ownerId>`. All of an owner's connections (multi-device) share
//! that room, and an event addressed to the room reaches each of them.
//! Cross-owner isolation is the hard invariant here: sends are filtered
//! on the room key, never broadcast.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::ws::Message;
use tokio::sync::{mpsc, RwLock};

use soledex_core::types::{DbId, Timestamp};

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// The room an owner's connections join.
pub fn owner_room(owner_id: DbId) -> String {
    format!("owner:{owner_id}")
}

/// Metadata for a single authenticated WebSocket connection.
pub struct Connection {
    /// The authenticated owner.
    pub owner_id: DbId,
    /// The room this connection belongs to (always the owner's room).
    pub room: String,
    /// Channel sender for outbound messages to this connection.
    pub sender: WsSender,
    /// When this connection was established.
    pub connected_at: Timestamp,
}

/// Manages all live WebSocket connections, grouped by room.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared across the application.
pub struct RoomRegistry {
    connections: RwLock<HashMap<String, Connection>>,
}

impl RoomRegistry {
    /// Create a new, empty registry.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register an authenticated connection in its owner's room.
    ///
    /// Returns the receiver half of the message channel so the caller can
    /// forward messages to the WebSocket sink.
    pub async fn join(
        &self,
        conn_id: String,
        owner_id: DbId,
    ) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Connection {
            owner_id,
            room: owner_room(owner_id),
            sender: tx,
            connected_at: chrono::Utc::now(),
        };
        self.connections.write().await.insert(conn_id, conn);
        rx
    }

    /// Remove a connection by its ID (disconnect path).
    pub async fn leave(&self, conn_id: &str) {
        self.connections.write().await.remove(conn_id);
    }

    /// Send a message to every connection in a room.
    ///
    /// Fire-and-forget: connections whose send channels are closed are
    /// silently skipped, and a room with zero members drops the message.
    /// Returns the number of connections the message was sent to.
    pub async fn send_to_room(&self, room: &str, message: Message) -> usize {
        let conns = self.connections.read().await;
        let mut count = 0;
        for conn in conns.values() {
            if conn.room == room {
                let _ = conn.sender.send(message.clone());
                count += 1;
            }
        }
        count
    }

    /// Number of live connections in a room.
    pub async fn room_size(&self, room: &str) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|c| c.room == room)
            .count()
    }

    /// Return the current number of active connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Send a Ping frame to every connected client.
    ///
    /// Used by the heartbeat task to keep connections alive and detect
    /// stale ones.
    pub async fn ping_all(&self) {
        let conns = self.connections.read().await;
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Ping(Bytes::new()));
        }
    }

    /// Send a Close frame to every connection, then clear the map.
    ///
    /// Used during graceful shutdown to notify all clients before the
    /// server stops accepting new connections.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Close(None));
        }
        conns.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Message {
        Message::Text(s.to_string().into())
    }

    #[tokio::test]
    async fn event_reaches_all_of_owners_connections_and_no_others() {
        let registry = RoomRegistry::new();

        // Two owners connected simultaneously, owner 1 on two devices.
        let mut u1_phone = registry.join("c1".into(), 1).await;
        let mut u1_laptop = registry.join("c2".into(), 1).await;
        let mut u2_phone = registry.join("c3".into(), 2).await;

        let sent = registry.send_to_room(&owner_room(1), text("for owner 1")).await;
        assert_eq!(sent, 2);

        assert!(matches!(u1_phone.try_recv(), Ok(Message::Text(_))));
        assert!(matches!(u1_laptop.try_recv(), Ok(Message::Text(_))));
        // Isolation: owner 2 must receive nothing.
        assert!(u2_phone.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_to_empty_room_drops_message() {
        let registry = RoomRegistry::new();
        let mut u1 = registry.join("c1".into(), 1).await;

        let sent = registry.send_to_room(&owner_room(42), text("nobody home")).await;
        assert_eq!(sent, 0);
        assert!(u1.try_recv().is_err());
    }

    #[tokio::test]
    async fn left_connection_no_longer_receives() {
        let registry = RoomRegistry::new();
        let mut rx = registry.join("c1".into(), 1).await;
        registry.leave("c1").await;

        let sent = registry.send_to_room(&owner_room(1), text("gone")).await;
        assert_eq!(sent, 0);
        // The sender side is dropped with the connection entry.
        assert!(rx.try_recv().is_err());
        assert_eq!(registry.connection_count().await, 0);
    }

    #[tokio::test]
    async fn room_size_tracks_multi_device() {
        let registry = RoomRegistry::new();
        registry.join("c1".into(), 7).await;
        registry.join("c2".into(), 7).await;
        registry.join("c3".into(), 8).await;

        assert_eq!(registry.room_size(&owner_room(7)).await, 2);
        assert_eq!(registry.room_size(&owner_room(8)).await, 1);
        assert_eq!(registry.connection_count().await, 3);
    }
}
