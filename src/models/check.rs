//! Audit record of one verification attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of check history. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacklinkCheck {
    pub id: i32,
    pub backlink_id: i32,
    pub checked_at: DateTime<Utc>,
    pub http_status: Option<i32>,
    pub is_present: bool,
    pub anchor_text: Option<String>,
    pub rel_attributes: Option<String>,
    pub error_message: Option<String>,
}
