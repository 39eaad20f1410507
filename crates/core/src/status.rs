//! Asset lifecycle status machine.
//!
//! An asset moves monotonically along the analysis pipeline:
//! `draft -> processing -> {active | partial | failed}`. The only
//! re-entry is an explicit retry, which takes a terminal asset back to
//! `processing`. Status strings are stored as-is in the `assets.status`
//! column and on the push-event wire format.

use serde::{Deserialize, Serialize};

/// Lifecycle status of an asset as seen by the analysis pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetStatus {
    /// Created but never submitted for analysis.
    Draft,
    /// A job is enqueued or in flight for this asset.
    Processing,
    /// Analysis succeeded; all extracted fields persisted.
    Active,
    /// Analysis succeeded with explicitly incomplete extraction.
    ///
    /// Reserved: the current service contract never signals this, but the
    /// type model, events, and client synchronizer all accept it.
    Partial,
    /// Analysis failed terminally (unrecoverable error or retries exhausted).
    Failed,
}

impl AssetStatus {
    /// Stable string form, matching the database column and wire format.
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetStatus::Draft => "draft",
            AssetStatus::Processing => "processing",
            AssetStatus::Active => "active",
            AssetStatus::Partial => "partial",
            AssetStatus::Failed => "failed",
        }
    }

    /// Parse the stable string form. Returns `None` for unknown strings.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(AssetStatus::Draft),
            "processing" => Some(AssetStatus::Processing),
            "active" => Some(AssetStatus::Active),
            "partial" => Some(AssetStatus::Partial),
            "failed" => Some(AssetStatus::Failed),
            _ => None,
        }
    }

    /// Whether this status ends a pipeline pass.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AssetStatus::Active | AssetStatus::Partial | AssetStatus::Failed
        )
    }

    /// Whether the pipeline may move an asset from `self` to `next`.
    ///
    /// Transitions are monotonic: draft feeds processing, processing feeds
    /// the three terminal states, and the only backward edge is an explicit
    /// retry taking a terminal asset back to processing.
    pub fn can_transition_to(&self, next: AssetStatus) -> bool {
        match (self, next) {
            (AssetStatus::Draft, AssetStatus::Processing) => true,
            (AssetStatus::Processing, n) if n.is_terminal() => true,
            // Explicit retry re-enters processing.
            (s, AssetStatus::Processing) if s.is_terminal() => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_path_is_allowed() {
        assert!(AssetStatus::Draft.can_transition_to(AssetStatus::Processing));
        assert!(AssetStatus::Processing.can_transition_to(AssetStatus::Active));
        assert!(AssetStatus::Processing.can_transition_to(AssetStatus::Partial));
        assert!(AssetStatus::Processing.can_transition_to(AssetStatus::Failed));
    }

    #[test]
    fn retry_reenters_processing_from_any_terminal() {
        assert!(AssetStatus::Active.can_transition_to(AssetStatus::Processing));
        assert!(AssetStatus::Partial.can_transition_to(AssetStatus::Processing));
        assert!(AssetStatus::Failed.can_transition_to(AssetStatus::Processing));
    }

    #[test]
    fn regressions_are_rejected() {
        assert!(!AssetStatus::Active.can_transition_to(AssetStatus::Draft));
        assert!(!AssetStatus::Processing.can_transition_to(AssetStatus::Draft));
        assert!(!AssetStatus::Failed.can_transition_to(AssetStatus::Active));
        assert!(!AssetStatus::Draft.can_transition_to(AssetStatus::Active));
    }

    #[test]
    fn same_status_is_not_a_transition() {
        assert!(!AssetStatus::Active.can_transition_to(AssetStatus::Active));
        assert!(!AssetStatus::Processing.can_transition_to(AssetStatus::Processing));
    }

    #[test]
    fn string_round_trip() {
        for status in [
            AssetStatus::Draft,
            AssetStatus::Processing,
            AssetStatus::Active,
            AssetStatus::Partial,
            AssetStatus::Failed,
        ] {
            assert_eq!(AssetStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AssetStatus::parse("archived"), None);
    }

    #[test]
    fn serde_uses_lowercase() {
        let json = serde_json::to_string(&AssetStatus::Active).unwrap();
        assert_eq!(json, "\"active\"");
        let back: AssetStatus = serde_json::from_str("\"partial\"").unwrap();
        assert_eq!(back, AssetStatus::Partial);
    }
}
