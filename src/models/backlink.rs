//! Backlink model: a claim that `source_url` links to `target_url`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a backlink.
///
/// Only the monitor's transition logic writes this field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BacklinkStatus {
    Active,
    Lost,
    Changed,
}

impl BacklinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Lost => "lost",
            Self::Changed => "changed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "lost" => Some(Self::Lost),
            "changed" => Some(Self::Changed),
            _ => None,
        }
    }
}

impl std::fmt::Display for BacklinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tracked backlink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Backlink {
    pub id: i32,
    /// User who created the backlink (owner of notification preferences).
    pub created_by: Option<i32>,
    /// Page expected to contain the link.
    pub source_url: String,
    /// URL the link should point at.
    pub target_url: String,
    pub anchor_text: Option<String>,
    /// Comma-joined lowercase rel tokens, e.g. `nofollow,sponsored`.
    pub rel_attributes: Option<String>,
    pub is_dofollow: bool,
    pub http_status: Option<i32>,
    pub status: BacklinkStatus,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub first_seen_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Backlink {
    /// Create a new, not yet persisted, backlink in the `active` state.
    pub fn new(source_url: String, target_url: String, created_by: Option<i32>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            created_by,
            source_url,
            target_url,
            anchor_text: None,
            rel_attributes: None,
            is_dofollow: true,
            http_status: None,
            status: BacklinkStatus::Active,
            last_checked_at: None,
            first_seen_at: now,
            created_at: now,
        }
    }

    /// Rel tokens as a list.
    pub fn rel_tokens(&self) -> Vec<&str> {
        self.rel_attributes
            .as_deref()
            .map(|s| s.split(',').filter(|t| !t.is_empty()).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            BacklinkStatus::Active,
            BacklinkStatus::Lost,
            BacklinkStatus::Changed,
        ] {
            assert_eq!(BacklinkStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(BacklinkStatus::from_str("deleted"), None);
    }

    #[test]
    fn test_new_backlink_is_active() {
        let link = Backlink::new(
            "https://blog.example.org/post".to_string(),
            "https://mysite.com".to_string(),
            Some(1),
        );
        assert_eq!(link.status, BacklinkStatus::Active);
        assert!(link.is_dofollow);
        assert!(link.last_checked_at.is_none());
    }

    #[test]
    fn test_rel_tokens() {
        let mut link = Backlink::new("a".into(), "b".into(), None);
        assert!(link.rel_tokens().is_empty());
        link.rel_attributes = Some("nofollow,sponsored".to_string());
        assert_eq!(link.rel_tokens(), vec!["nofollow", "sponsored"]);
    }
}
