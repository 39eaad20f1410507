//! Client-side state synchronization from push events.
//!
//! On each push event the synchronizer merges status and result payload
//! into the cached asset in place, marks the list view stale so it is
//! refetched on next access, and raises a classified user notification.
//! Terminal events apply idempotently: receiving the same event twice
//! merges the same fields again and never corrupts the cache.

use std::collections::HashMap;

use tokio::sync::mpsc;

use soledex_core::status::AssetStatus;
use soledex_core::types::{DbId, Timestamp};
use soledex_events::AssetEvent;

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// The locally cached representation of one asset.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedAsset {
    pub asset_id: DbId,
    pub status: AssetStatus,
    pub ai_metadata: Option<serde_json::Value>,
    pub processed_image_url: Option<String>,
    pub error: Option<String>,
    pub updated_at: Timestamp,
}

/// In-memory asset cache plus list-view staleness tracking.
#[derive(Debug, Default)]
pub struct AssetCache {
    entries: HashMap<DbId, CachedAsset>,
    list_stale: bool,
}

impl AssetCache {
    pub fn get(&self, asset_id: DbId) -> Option<&CachedAsset> {
        self.entries.get(&asset_id)
    }

    /// Seed an entry from a fetched asset (list or detail response).
    pub fn seed(&mut self, asset: CachedAsset) {
        self.entries.insert(asset.asset_id, asset);
    }

    /// Whether aggregate/list views must be refetched on next access.
    pub fn is_list_stale(&self) -> bool {
        self.list_stale
    }

    /// Called after the list view has been refetched.
    pub fn mark_list_refetched(&mut self) {
        self.list_stale = false;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge one push event into the cache (insert if absent).
    ///
    /// Later state wins even when an intermediate transition was missed:
    /// delivery is best-effort, so the client may never have observed
    /// `processing`. Unexpected edges are logged, not rejected.
    fn merge_event(&mut self, event: &AssetEvent) {
        match self.entries.get_mut(&event.asset_id) {
            Some(entry) => {
                if entry.status != event.status
                    && !entry.status.can_transition_to(event.status)
                {
                    tracing::debug!(
                        asset_id = event.asset_id,
                        from = %entry.status,
                        to = %event.status,
                        "Applying out-of-order status transition",
                    );
                }
                entry.status = event.status;
                if event.ai_metadata.is_some() {
                    entry.ai_metadata = event.ai_metadata.clone();
                }
                if event.processed_image_url.is_some() {
                    entry.processed_image_url = event.processed_image_url.clone();
                }
                // A successful pass clears any stale failure reason.
                entry.error = event.error.clone();
                entry.updated_at = event.timestamp;
            }
            None => {
                self.entries.insert(
                    event.asset_id,
                    CachedAsset {
                        asset_id: event.asset_id,
                        status: event.status,
                        ai_metadata: event.ai_metadata.clone(),
                        processed_image_url: event.processed_image_url.clone(),
                        error: event.error.clone(),
                        updated_at: event.timestamp,
                    },
                );
            }
        }
        self.list_stale = true;
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Classification of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Partial,
    Failure,
}

impl NotificationKind {
    /// Classify a terminal status; `None` for non-terminal statuses.
    fn from_status(status: AssetStatus) -> Option<Self> {
        match status {
            AssetStatus::Active => Some(NotificationKind::Success),
            AssetStatus::Partial => Some(NotificationKind::Partial),
            AssetStatus::Failed => Some(NotificationKind::Failure),
            AssetStatus::Draft | AssetStatus::Processing => None,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            NotificationKind::Success => "Sneaker analysis complete.",
            NotificationKind::Partial => "Sneaker analysis partially complete.",
            NotificationKind::Failure => "Sneaker analysis failed.",
        }
    }
}

/// A notification ready for the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub struct UserNotification {
    pub kind: NotificationKind,
    pub asset_id: DbId,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Synchronizer
// ---------------------------------------------------------------------------

/// Applies push events to the cache and raises notifications.
pub struct StateSynchronizer {
    cache: AssetCache,
    notifications: mpsc::UnboundedSender<UserNotification>,
}

impl StateSynchronizer {
    /// Create a synchronizer and the receiver for its notifications.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<UserNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                cache: AssetCache::default(),
                notifications: tx,
            },
            rx,
        )
    }

    pub fn cache(&self) -> &AssetCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut AssetCache {
        &mut self.cache
    }

    /// Apply one push event: merge the cache, mark lists stale, notify.
    pub fn apply_event(&mut self, event: &AssetEvent) {
        self.cache.merge_event(event);

        if let Some(kind) = NotificationKind::from_status(event.status) {
            // The UI may have gone away; a closed channel is not an error.
            let _ = self.notifications.send(UserNotification {
                kind,
                asset_id: event.asset_id,
                message: kind.message().to_string(),
            });
        }

        tracing::debug!(
            asset_id = event.asset_id,
            status = %event.status,
            "Applied push event",
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn success_event(asset_id: DbId) -> AssetEvent {
        AssetEvent::success(
            asset_id,
            1,
            AssetStatus::Active,
            serde_json::json!({"brand": {"value": "Nike", "confidence": 0.8}}),
            Some("https://cdn.example/a.webp".into()),
        )
    }

    #[test]
    fn success_event_populates_cache_and_notifies() {
        let (mut sync, mut rx) = StateSynchronizer::new();

        sync.apply_event(&success_event(5));

        let cached = sync.cache().get(5).expect("entry inserted");
        assert_eq!(cached.status, AssetStatus::Active);
        assert_eq!(cached.ai_metadata.as_ref().unwrap()["brand"]["value"], "Nike");
        assert!(cached.error.is_none());
        assert!(sync.cache().is_list_stale());

        let note = rx.try_recv().expect("notification raised");
        assert_eq!(note.kind, NotificationKind::Success);
        assert_eq!(note.asset_id, 5);
    }

    #[test]
    fn duplicate_terminal_event_is_idempotent() {
        let (mut sync, mut rx) = StateSynchronizer::new();
        let event = success_event(5);

        sync.apply_event(&event);
        let first = sync.cache().get(5).cloned().unwrap();

        sync.apply_event(&event);
        let second = sync.cache().get(5).cloned().unwrap();

        // Merge, don't append: the cache holds one identical entry.
        assert_eq!(first, second);
        assert_eq!(sync.cache().len(), 1);

        // Each receipt still raises its notification.
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn failure_event_records_reason_and_notifies_failure() {
        let (mut sync, mut rx) = StateSynchronizer::new();

        sync.apply_event(&AssetEvent::failure(9, 1, "retries exhausted"));

        let cached = sync.cache().get(9).unwrap();
        assert_eq!(cached.status, AssetStatus::Failed);
        assert_eq!(cached.error.as_deref(), Some("retries exhausted"));

        let note = rx.try_recv().unwrap();
        assert_eq!(note.kind, NotificationKind::Failure);
    }

    #[test]
    fn retry_success_after_failure_clears_error() {
        let (mut sync, _rx) = StateSynchronizer::new();

        sync.apply_event(&AssetEvent::failure(9, 1, "service down"));
        // A later retry succeeded; the failed->active edge is applied
        // even though the client never saw the processing re-entry.
        sync.apply_event(&success_event(9));

        let cached = sync.cache().get(9).unwrap();
        assert_eq!(cached.status, AssetStatus::Active);
        assert!(cached.error.is_none());
        assert!(cached.ai_metadata.is_some());
    }

    #[test]
    fn seeded_entry_is_merged_in_place() {
        let (mut sync, _rx) = StateSynchronizer::new();
        sync.cache_mut().seed(CachedAsset {
            asset_id: 5,
            status: AssetStatus::Processing,
            ai_metadata: None,
            processed_image_url: None,
            error: None,
            updated_at: Utc::now(),
        });

        sync.apply_event(&success_event(5));

        assert_eq!(sync.cache().len(), 1);
        let cached = sync.cache().get(5).unwrap();
        assert_eq!(cached.status, AssetStatus::Active);
        assert!(cached.processed_image_url.is_some());
    }

    #[test]
    fn list_staleness_resets_after_refetch() {
        let (mut sync, _rx) = StateSynchronizer::new();
        assert!(!sync.cache().is_list_stale());

        sync.apply_event(&success_event(1));
        assert!(sync.cache().is_list_stale());

        sync.cache_mut().mark_list_refetched();
        assert!(!sync.cache().is_list_stale());
    }

    #[test]
    fn partial_status_classifies_as_partial_notification() {
        let (mut sync, mut rx) = StateSynchronizer::new();

        // Reserved status: never produced by the current worker, but the
        // client accepts it.
        sync.apply_event(&AssetEvent::success(
            3,
            1,
            AssetStatus::Partial,
            serde_json::json!({"brand": {"value": "Nike", "confidence": 0.8}}),
            None,
        ));

        assert_eq!(sync.cache().get(3).unwrap().status, AssetStatus::Partial);
        assert_eq!(rx.try_recv().unwrap().kind, NotificationKind::Partial);
    }
}
