//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the hub between the analysis worker (publisher) and the
//! WebSocket forwarder (subscriber). It is designed to be shared via
//! `Arc<EventBus>` across the application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use soledex_core::status::AssetStatus;
use soledex_core::types::DbId;

// ---------------------------------------------------------------------------
// AssetEvent
// ---------------------------------------------------------------------------

/// Wire name of the analysis completion event.
pub const EVENT_ASSET_PROCESSED: &str = "asset_processed";

/// Push event emitted when the pipeline finishes a pass over an asset.
///
/// Serialized verbatim onto the WebSocket wire, hence the camelCase
/// renames. `owner_id` is routing metadata only and never leaves the
/// server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetEvent {
    /// Always [`EVENT_ASSET_PROCESSED`].
    pub event: String,

    #[serde(rename = "assetId")]
    pub asset_id: DbId,

    /// Addressing: the owner whose room receives this event.
    #[serde(skip)]
    pub owner_id: DbId,

    /// Terminal status of this pass (`active`, `partial`, or `failed`).
    pub status: AssetStatus,

    /// Normalized extraction result; present on success only.
    #[serde(rename = "aiMetadata", skip_serializing_if = "Option::is_none")]
    pub ai_metadata: Option<serde_json::Value>,

    #[serde(rename = "processedImageUrl", skip_serializing_if = "Option::is_none")]
    pub processed_image_url: Option<String>,

    /// Failure reason; present on failure only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub timestamp: DateTime<Utc>,
}

impl AssetEvent {
    /// Build a success event (`active` or `partial`).
    pub fn success(
        asset_id: DbId,
        owner_id: DbId,
        status: AssetStatus,
        ai_metadata: serde_json::Value,
        processed_image_url: Option<String>,
    ) -> Self {
        Self {
            event: EVENT_ASSET_PROCESSED.to_string(),
            asset_id,
            owner_id,
            status,
            ai_metadata: Some(ai_metadata),
            processed_image_url,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Build a terminal failure event.
    pub fn failure(asset_id: DbId, owner_id: DbId, error: impl Into<String>) -> Self {
        Self {
            event: EVENT_ASSET_PROCESSED.to_string(),
            asset_id,
            owner_id,
            status: AssetStatus::Failed,
            ai_metadata: None,
            processed_image_url: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }

    /// The owner-scoped room this event is addressed to.
    pub fn room(&self) -> String {
        format!("owner:{}", self.owner_id)
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`AssetEvent`].
pub struct EventBus {
    sender: broadcast::Sender<AssetEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Fire-and-forget: if there are no active subscribers the event is
    /// silently dropped.
    pub fn publish(&self, event: AssetEvent) {
        // Ignore the SendError -- it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<AssetEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(AssetEvent::success(
            42,
            7,
            AssetStatus::Active,
            serde_json::json!({"brand": {"value": "Nike", "confidence": 0.8}}),
            Some("https://cdn.example/processed.webp".into()),
        ));

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.event, EVENT_ASSET_PROCESSED);
        assert_eq!(received.asset_id, 42);
        assert_eq!(received.owner_id, 7);
        assert_eq!(received.status, AssetStatus::Active);
        assert_eq!(received.room(), "owner:7");
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(AssetEvent::failure(1, 2, "analysis service returned 500"));

        let e1 = rx1.recv().await.expect("subscriber 1 should receive");
        let e2 = rx2.recv().await.expect("subscriber 2 should receive");

        assert_eq!(e1.asset_id, 1);
        assert_eq!(e2.asset_id, 1);
        assert_eq!(e1.status, AssetStatus::Failed);
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(AssetEvent::failure(9, 9, "dropped on the floor"));
    }

    #[test]
    fn wire_format_uses_camel_case_and_omits_empty_fields() {
        let event = AssetEvent::success(
            11,
            3,
            AssetStatus::Active,
            serde_json::json!({"brand": {"value": "Nike", "confidence": 0.8}}),
            None,
        );
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event"], "asset_processed");
        assert_eq!(json["assetId"], 11);
        assert_eq!(json["status"], "active");
        assert!(json.get("aiMetadata").is_some());
        // Routing metadata and empty optionals stay off the wire.
        assert!(json.get("owner_id").is_none());
        assert!(json.get("ownerId").is_none());
        assert!(json.get("processedImageUrl").is_none());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn failure_wire_format_carries_error() {
        let event = AssetEvent::failure(12, 3, "retries exhausted");
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "retries exhausted");
        assert!(json.get("aiMetadata").is_none());
    }
}
