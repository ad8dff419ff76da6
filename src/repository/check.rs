//! Check history repository.
//!
//! Rows are append-only; they are written by `BacklinkRepository::record_check`
//! together with the backlink update and never modified afterwards.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::BacklinkCheckRecord;
use super::pool::{DbError, DbPool};
use super::util::parse_datetime;
use crate::models::BacklinkCheck;
use crate::schema::backlink_checks;

impl From<BacklinkCheckRecord> for BacklinkCheck {
    fn from(record: BacklinkCheckRecord) -> Self {
        BacklinkCheck {
            id: record.id,
            backlink_id: record.backlink_id,
            checked_at: parse_datetime(&record.checked_at),
            http_status: record.http_status,
            is_present: record.is_present != 0,
            anchor_text: record.anchor_text,
            rel_attributes: record.rel_attributes,
            error_message: record.error_message,
        }
    }
}

/// Read access to check history.
#[derive(Clone)]
pub struct CheckRepository {
    pool: DbPool,
}

impl CheckRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Most recent checks for a backlink, newest first.
    pub async fn recent(&self, backlink_id: i32, limit: i64) -> Result<Vec<BacklinkCheck>, DbError> {
        let mut conn = self.pool.get().await?;

        backlink_checks::table
            .filter(backlink_checks::backlink_id.eq(backlink_id))
            .order(backlink_checks::id.desc())
            .limit(limit)
            .load::<BacklinkCheckRecord>(&mut conn)
            .await
            .map(|records| records.into_iter().map(BacklinkCheck::from).collect())
    }

    /// Number of checks recorded for a backlink.
    pub async fn count_for(&self, backlink_id: i32) -> Result<i64, DbError> {
        let mut conn = self.pool.get().await?;

        backlink_checks::table
            .filter(backlink_checks::backlink_id.eq(backlink_id))
            .count()
            .get_result(&mut conn)
            .await
    }

    /// Percentage of checks since `since` that found the link present.
    ///
    /// Returns `None` when there are no checks in the window.
    pub async fn uptime(
        &self,
        backlink_id: i32,
        since: DateTime<Utc>,
    ) -> Result<Option<f64>, DbError> {
        let mut conn = self.pool.get().await?;
        let since = since.to_rfc3339();

        let flags: Vec<i32> = backlink_checks::table
            .filter(backlink_checks::backlink_id.eq(backlink_id))
            .filter(backlink_checks::checked_at.ge(&since))
            .select(backlink_checks::is_present)
            .load(&mut conn)
            .await?;

        Ok(uptime_percentage(&flags))
    }
}

fn uptime_percentage(flags: &[i32]) -> Option<f64> {
    if flags.is_empty() {
        return None;
    }
    let present = flags.iter().filter(|f| **f != 0).count();
    Some(present as f64 * 100.0 / flags.len() as f64)
}
