//! Backlink status state machine.
//!
//! Pure functions: given the stored backlink and a fresh check result,
//! decide the next status, whether an alert fires, and which columns to
//! write. Nothing here touches the database.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::checker::CheckResult;
use crate::models::{AlertType, Backlink, BacklinkStatus};
use crate::repository::util::bool_to_int;
use crate::repository::{AlertDraft, BacklinkChangeset, NewBacklinkCheck};

/// Old and new value of one attribute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub old: Value,
    pub new: Value,
}

/// Attribute differences between the stored backlink and a check.
///
/// Empty means "no change".
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AttributeDiff(BTreeMap<&'static str, FieldChange>);

impl AttributeDiff {
    /// Compare `anchor_text` (only when the check saw some), `rel_attributes`
    /// and `is_dofollow`. Checks that did not find the link have no diff.
    pub fn between(stored: &Backlink, result: &CheckResult) -> Self {
        let mut fields = BTreeMap::new();
        if !result.is_present {
            return Self(fields);
        }

        if let Some(new) = result.anchor_text.as_deref() {
            if stored.anchor_text.as_deref() != Some(new) {
                fields.insert(
                    "anchor_text",
                    FieldChange {
                        old: json!(stored.anchor_text),
                        new: json!(new),
                    },
                );
            }
        }

        if stored.rel_attributes != result.rel_attributes {
            fields.insert(
                "rel_attributes",
                FieldChange {
                    old: json!(stored.rel_attributes),
                    new: json!(result.rel_attributes),
                },
            );
        }

        if let Some(new) = result.is_dofollow {
            if stored.is_dofollow != new {
                fields.insert(
                    "is_dofollow",
                    FieldChange {
                        old: json!(stored.is_dofollow),
                        new: json!(new),
                    },
                );
            }
        }

        Self(fields)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.keys().copied()
    }

    pub fn get(&self, field: &str) -> Option<&FieldChange> {
        self.0.get(field)
    }

    /// `{field: {old, new}}` map for alert metadata.
    pub fn to_metadata(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({}))
    }
}

/// What a check result does to a backlink.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub previous: BacklinkStatus,
    pub next: BacklinkStatus,
    pub alert: Option<AlertType>,
    pub diff: AttributeDiff,
}

impl Transition {
    /// Apply the transition table to a stored backlink.
    pub fn decide(stored: &Backlink, result: &CheckResult) -> Self {
        let previous = stored.status;
        let diff = if is_first_observation(stored) {
            AttributeDiff::default()
        } else {
            AttributeDiff::between(stored, result)
        };

        let (next, alert) = match (previous, result.is_present) {
            (BacklinkStatus::Lost, false) => (BacklinkStatus::Lost, None),
            (_, false) => (BacklinkStatus::Lost, Some(AlertType::BacklinkLost)),
            (BacklinkStatus::Lost, true) => {
                (BacklinkStatus::Active, Some(AlertType::BacklinkRecovered))
            }
            (BacklinkStatus::Active, true) if diff.is_empty() => (BacklinkStatus::Active, None),
            (BacklinkStatus::Active, true) => {
                (BacklinkStatus::Changed, Some(AlertType::BacklinkChanged))
            }
            // Attributes settled: the stored row already reflects the change.
            (BacklinkStatus::Changed, true) if diff.is_empty() => (BacklinkStatus::Active, None),
            (BacklinkStatus::Changed, true) => (BacklinkStatus::Changed, None),
        };

        Self {
            previous,
            next,
            alert,
            diff,
        }
    }

    pub fn is_status_change(&self) -> bool {
        self.previous != self.next
    }

    /// Columns to write on the backlink row.
    pub fn changeset(
        &self,
        stored: &Backlink,
        result: &CheckResult,
        now: DateTime<Utc>,
    ) -> BacklinkChangeset {
        let mut changes = BacklinkChangeset {
            status: Some(self.next.as_str().to_string()),
            last_checked_at: Some(now.to_rfc3339()),
            http_status: result.http_status,
            ..Default::default()
        };

        if result.is_present {
            changes.rel_attributes = Some(result.rel_attributes.clone());
            changes.is_dofollow = result.is_dofollow.map(bool_to_int);
            changes.anchor_text = result
                .anchor_text
                .clone()
                .filter(|text| stored.anchor_text.as_deref() != Some(text.as_str()));
        }

        changes
    }

    /// The backlink as it will look once `changeset` is applied.
    pub fn apply(&self, stored: &Backlink, result: &CheckResult, now: DateTime<Utc>) -> Backlink {
        let mut updated = stored.clone();
        updated.status = self.next;
        updated.last_checked_at = Some(now);
        if result.http_status.is_some() {
            updated.http_status = result.http_status;
        }
        if result.is_present {
            updated.rel_attributes = result.rel_attributes.clone();
            if let Some(dofollow) = result.is_dofollow {
                updated.is_dofollow = dofollow;
            }
            if result.anchor_text.is_some() {
                updated.anchor_text = result.anchor_text.clone();
            }
        }
        updated
    }

    /// Alert to raise, if any.
    pub fn alert_draft(&self, stored: &Backlink, result: &CheckResult) -> Option<AlertDraft> {
        let alert_type = self.alert?;
        let (title, message, metadata) = match alert_type {
            AlertType::BacklinkLost => (
                "Backlink lost".to_string(),
                format!(
                    "The link to {} is no longer present on {}: {}",
                    stored.target_url,
                    stored.source_url,
                    result.error_message.as_deref().unwrap_or("unknown error")
                ),
                json!({
                    "previous_status": self.previous.as_str(),
                    "http_status": result.http_status,
                    "error_message": result.error_message,
                    "outcome": result.outcome.as_str(),
                }),
            ),
            AlertType::BacklinkChanged => (
                "Backlink changed".to_string(),
                format!(
                    "The link to {} on {} changed: {}",
                    stored.target_url,
                    stored.source_url,
                    self.diff.fields().collect::<Vec<_>>().join(", ")
                ),
                self.diff.to_metadata(),
            ),
            AlertType::BacklinkRecovered => (
                "Backlink recovered".to_string(),
                format!(
                    "The link to {} is present again on {}",
                    stored.target_url, stored.source_url
                ),
                json!({
                    "http_status": result.http_status,
                    "anchor_text": result.anchor_text,
                    "rel_attributes": result.rel_attributes,
                }),
            ),
        };

        Some(AlertDraft {
            alert_type,
            severity: alert_type.severity(),
            title,
            message,
            metadata,
        })
    }
}

/// Audit row for a check.
pub fn check_record(backlink_id: i32, result: &CheckResult, now: DateTime<Utc>) -> NewBacklinkCheck {
    NewBacklinkCheck {
        backlink_id,
        checked_at: now.to_rfc3339(),
        http_status: result.http_status,
        is_present: bool_to_int(result.is_present),
        anchor_text: result.anchor_text.clone(),
        rel_attributes: result.rel_attributes.clone(),
        error_message: result.error_message.clone(),
    }
}

/// A never-checked backlink with no recorded attributes adopts what the
/// first successful check sees instead of reporting it as a change.
fn is_first_observation(stored: &Backlink) -> bool {
    stored.last_checked_at.is_none()
        && stored.anchor_text.is_none()
        && stored.rel_attributes.is_none()
}
