//! Event-to-room forwarding.
//!
//! [`EventForwarder`] subscribes to the event bus and multicasts each
//! [`AssetEvent`] to its owner's room. Delivery is fire-and-forget: no
//! acknowledgment tracking, no persistence, and events addressed to
//! owners with zero live connections are dropped on the floor.

use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::broadcast;

use soledex_events::AssetEvent;

use crate::ws::RoomRegistry;

/// Routes pipeline events to the owner's live connections.
pub struct EventForwarder {
    rooms: Arc<RoomRegistry>,
}

impl EventForwarder {
    /// Create a new forwarder over the given room registry.
    pub fn new(rooms: Arc<RoomRegistry>) -> Self {
        Self { rooms }
    }

    /// Run the main forwarding loop.
    ///
    /// Subscribes to the event bus via `receiver` and processes each
    /// event. The loop exits when the channel is closed (i.e. the
    /// [`EventBus`](soledex_events::EventBus) is dropped).
    pub async fn run(self, mut receiver: broadcast::Receiver<AssetEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => self.forward(&event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event forwarder lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, forwarder shutting down");
                    break;
                }
            }
        }
    }

    /// Multicast one event to its owner's room.
    async fn forward(&self, event: &AssetEvent) {
        let room = event.room();
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, asset_id = event.asset_id, "Failed to serialize event");
                return;
            }
        };

        let delivered = self
            .rooms
            .send_to_room(&room, Message::Text(payload.into()))
            .await;

        tracing::debug!(
            room = %room,
            asset_id = event.asset_id,
            status = %event.status,
            delivered,
            "Event forwarded",
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
