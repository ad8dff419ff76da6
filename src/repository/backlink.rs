//! Backlink repository.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::alert::{insert_alert, AlertDraft};
use super::models::{BacklinkRecord, LastInsertRowId, NewBacklink, NewBacklinkCheck};
use super::pool::{DbError, DbPool};
use super::util::{bool_to_int, parse_datetime, parse_datetime_opt};
use crate::models::{Alert, Backlink, BacklinkStatus, CheckFrequency};
use crate::schema::{backlink_checks, backlinks, users};

impl From<BacklinkRecord> for Backlink {
    fn from(record: BacklinkRecord) -> Self {
        Backlink {
            id: record.id,
            created_by: record.created_by,
            source_url: record.source_url,
            target_url: record.target_url,
            anchor_text: record.anchor_text,
            rel_attributes: record.rel_attributes,
            is_dofollow: record.is_dofollow != 0,
            http_status: record.http_status,
            status: BacklinkStatus::from_str(&record.status).unwrap_or(BacklinkStatus::Active),
            last_checked_at: parse_datetime_opt(record.last_checked_at),
            first_seen_at: parse_datetime(&record.first_seen_at),
            created_at: parse_datetime(&record.created_at),
        }
    }
}

/// Column changes applied to a backlink after a check.
///
/// `None` fields are left untouched. `rel_attributes` is doubly optional so
/// a found link without `rel` can clear a previously stored value.
#[derive(AsChangeset, Debug, Clone, Default)]
#[diesel(table_name = backlinks)]
pub struct BacklinkChangeset {
    pub status: Option<String>,
    pub last_checked_at: Option<String>,
    pub http_status: Option<i32>,
    pub anchor_text: Option<String>,
    pub rel_attributes: Option<Option<String>>,
    pub is_dofollow: Option<i32>,
}

/// Rows written by `BacklinkRepository::record_check`.
#[derive(Debug, Clone)]
pub struct RecordedCheck {
    pub check_id: i32,
    pub alert: Option<Alert>,
}

/// Backlink repository.
#[derive(Clone)]
pub struct BacklinkRepository {
    pool: DbPool,
}

impl BacklinkRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert a new backlink and return its id.
    pub async fn create(&self, backlink: &Backlink) -> Result<i32, DbError> {
        let mut conn = self.pool.get().await?;

        let first_seen_at = backlink.first_seen_at.to_rfc3339();
        let created_at = backlink.created_at.to_rfc3339();
        let last_checked_at = backlink.last_checked_at.map(|dt| dt.to_rfc3339());

        diesel::insert_into(backlinks::table)
            .values(NewBacklink {
                created_by: backlink.created_by,
                source_url: &backlink.source_url,
                target_url: &backlink.target_url,
                anchor_text: backlink.anchor_text.as_deref(),
                rel_attributes: backlink.rel_attributes.as_deref(),
                is_dofollow: bool_to_int(backlink.is_dofollow),
                http_status: backlink.http_status,
                status: backlink.status.as_str(),
                last_checked_at: last_checked_at.as_deref(),
                first_seen_at: &first_seen_at,
                created_at: &created_at,
            })
            .execute(&mut conn)
            .await?;

        let row: LastInsertRowId = diesel::sql_query("SELECT last_insert_rowid()")
            .get_result(&mut conn)
            .await?;
        Ok(row.id as i32)
    }

    /// Get a backlink by id.
    pub async fn get(&self, id: i32) -> Result<Option<Backlink>, DbError> {
        let mut conn = self.pool.get().await?;

        backlinks::table
            .find(id)
            .first::<BacklinkRecord>(&mut conn)
            .await
            .optional()
            .map(|opt| opt.map(Backlink::from))
    }

    /// List backlinks, optionally restricted to one status.
    pub async fn list(&self, status: Option<BacklinkStatus>) -> Result<Vec<Backlink>, DbError> {
        let mut conn = self.pool.get().await?;

        let mut query = backlinks::table.order(backlinks::id.asc()).into_boxed();
        if let Some(status) = status {
            query = query.filter(backlinks::status.eq(status.as_str()));
        }

        query
            .load::<BacklinkRecord>(&mut conn)
            .await
            .map(|records| records.into_iter().map(Backlink::from).collect())
    }

    /// Ids of backlinks whose last check is older than their owner's
    /// check frequency (or that were never checked).
    pub async fn due_ids(&self, now: DateTime<Utc>) -> Result<Vec<i32>, DbError> {
        let mut conn = self.pool.get().await?;

        let rows: Vec<(i32, Option<String>, Option<String>)> = backlinks::table
            .left_join(users::table)
            .select((
                backlinks::id,
                backlinks::last_checked_at,
                users::check_frequency.nullable(),
            ))
            .order(backlinks::id.asc())
            .load(&mut conn)
            .await?;

        Ok(rows
            .into_iter()
            .filter(|(_, last_checked, frequency)| {
                let frequency = frequency
                    .as_deref()
                    .and_then(CheckFrequency::from_str)
                    .unwrap_or_default();
                match parse_datetime_opt(last_checked.clone()) {
                    Some(last) => now - last >= frequency.interval(),
                    None => true,
                }
            })
            .map(|(id, _, _)| id)
            .collect())
    }

    /// Count backlinks per status.
    pub async fn count_by_status(&self) -> Result<HashMap<BacklinkStatus, i64>, DbError> {
        use diesel::dsl::count_star;
        let mut conn = self.pool.get().await?;

        let rows: Vec<(String, i64)> = backlinks::table
            .group_by(backlinks::status)
            .select((backlinks::status, count_star()))
            .load(&mut conn)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(status, n)| BacklinkStatus::from_str(&status).map(|s| (s, n)))
            .collect())
    }

    /// Delete a backlink. Checks and alerts cascade.
    pub async fn delete(&self, id: i32) -> Result<bool, DbError> {
        let mut conn = self.pool.get().await?;

        let rows = diesel::delete(backlinks::table.find(id))
            .execute(&mut conn)
            .await?;

        Ok(rows > 0)
    }

    /// Write a check record, the resulting backlink update and the alert the
    /// transition raised, all in one transaction.
    ///
    /// If any write fails nothing is kept, so a transition is never stored
    /// without its alert.
    pub async fn record_check(
        &self,
        backlink_id: i32,
        check: NewBacklinkCheck,
        changes: BacklinkChangeset,
        alert: Option<AlertDraft>,
    ) -> Result<RecordedCheck, DbError> {
        let mut conn = self.pool.get().await?;

        conn.transaction(move |conn| {
            Box::pin(async move {
                diesel::insert_into(backlink_checks::table)
                    .values(&check)
                    .execute(conn)
                    .await?;

                let row: LastInsertRowId = diesel::sql_query("SELECT last_insert_rowid()")
                    .get_result(conn)
                    .await?;

                let updated = diesel::update(backlinks::table.find(backlink_id))
                    .set(&changes)
                    .execute(conn)
                    .await?;
                if updated == 0 {
                    return Err(DbError::NotFound);
                }

                let alert = match alert {
                    Some(draft) => Some(insert_alert(conn, backlink_id, &draft).await?),
                    None => None,
                };

                Ok(RecordedCheck {
                    check_id: row.id as i32,
                    alert,
                })
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertSeverity, AlertType};
    use crate::repository::DbContext;
    use diesel_async::SimpleAsyncConnection;
    use tempfile::tempdir;

    async fn setup() -> (DbContext, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();
        (ctx, dir)
    }

    fn sample() -> Backlink {
        Backlink::new(
            "https://blog.example.org/post".to_string(),
            "https://mysite.com".to_string(),
            None,
        )
    }

    #[tokio::test]
    async fn test_backlink_crud() {
        let (ctx, _dir) = setup().await;
        let repo = ctx.backlinks();

        let id = repo.create(&sample()).await.unwrap();
        let fetched = repo.get(id).await.unwrap().unwrap();
        assert_eq!(fetched.source_url, "https://blog.example.org/post");
        assert_eq!(fetched.status, BacklinkStatus::Active);

        assert_eq!(repo.list(None).await.unwrap().len(), 1);
        assert!(repo
            .list(Some(BacklinkStatus::Lost))
            .await
            .unwrap()
            .is_empty());

        assert!(repo.delete(id).await.unwrap());
        assert!(repo.get(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_check_updates_only_given_columns() {
        let (ctx, _dir) = setup().await;
        let repo = ctx.backlinks();

        let mut link = sample();
        link.anchor_text = Some("Old anchor".to_string());
        link.rel_attributes = Some("nofollow".to_string());
        link.is_dofollow = false;
        let id = repo.create(&link).await.unwrap();

        let now = Utc::now().to_rfc3339();
        let check = NewBacklinkCheck {
            backlink_id: id,
            checked_at: now.clone(),
            http_status: Some(200),
            is_present: 1,
            anchor_text: None,
            rel_attributes: None,
            error_message: None,
        };
        let changes = BacklinkChangeset {
            status: Some("changed".to_string()),
            last_checked_at: Some(now),
            http_status: Some(200),
            anchor_text: None,
            rel_attributes: Some(None),
            is_dofollow: Some(1),
        };
        let recorded = repo.record_check(id, check, changes, None).await.unwrap();
        assert!(recorded.check_id > 0);
        assert!(recorded.alert.is_none());

        let updated = repo.get(id).await.unwrap().unwrap();
        assert_eq!(updated.status, BacklinkStatus::Changed);
        assert_eq!(updated.anchor_text.as_deref(), Some("Old anchor"));
        assert_eq!(updated.rel_attributes, None);
        assert!(updated.is_dofollow);
        assert_eq!(updated.http_status, Some(200));
        assert!(updated.last_checked_at.is_some());
    }

    #[tokio::test]
    async fn test_record_check_for_missing_backlink_rolls_back() {
        let (ctx, _dir) = setup().await;
        let repo = ctx.backlinks();
        let id = repo.create(&sample()).await.unwrap();

        let check = NewBacklinkCheck {
            backlink_id: id,
            checked_at: Utc::now().to_rfc3339(),
            http_status: None,
            is_present: 0,
            anchor_text: None,
            rel_attributes: None,
            error_message: Some("boom".to_string()),
        };
        // Update targets a different row, so the whole transaction fails.
        let result = repo
            .record_check(id + 100, check, BacklinkChangeset::default(), None)
            .await;
        assert!(result.is_err());
        assert_eq!(ctx.checks().count_for(id).await.unwrap(), 0);
    }

    fn lost_check(backlink_id: i32) -> (NewBacklinkCheck, BacklinkChangeset, AlertDraft) {
        let now = Utc::now().to_rfc3339();
        let check = NewBacklinkCheck {
            backlink_id,
            checked_at: now.clone(),
            http_status: Some(404),
            is_present: 0,
            anchor_text: None,
            rel_attributes: None,
            error_message: Some("HTTP 404".to_string()),
        };
        let changes = BacklinkChangeset {
            status: Some("lost".to_string()),
            last_checked_at: Some(now),
            http_status: Some(404),
            ..Default::default()
        };
        let draft = AlertDraft {
            alert_type: AlertType::BacklinkLost,
            severity: AlertSeverity::Critical,
            title: "Backlink lost".to_string(),
            message: "HTTP 404".to_string(),
            metadata: serde_json::json!({"http_status": 404}),
        };
        (check, changes, draft)
    }

    #[tokio::test]
    async fn test_record_check_stores_alert_with_transition() {
        let (ctx, _dir) = setup().await;
        let repo = ctx.backlinks();
        let id = repo.create(&sample()).await.unwrap();

        let (check, changes, draft) = lost_check(id);
        let recorded = repo
            .record_check(id, check, changes, Some(draft))
            .await
            .unwrap();

        let alert = recorded.alert.unwrap();
        assert_eq!(alert.backlink_id, id);
        assert_eq!(alert.alert_type, AlertType::BacklinkLost);
        assert_eq!(ctx.alerts().for_backlink(id).await.unwrap().len(), 1);
        assert_eq!(
            repo.get(id).await.unwrap().unwrap().status,
            BacklinkStatus::Lost
        );
    }

    #[tokio::test]
    async fn test_failed_alert_insert_rolls_back_transition() {
        let (ctx, _dir) = setup().await;
        let repo = ctx.backlinks();
        let id = repo.create(&sample()).await.unwrap();

        let mut conn = ctx.pool().get().await.unwrap();
        conn.batch_execute(
            "CREATE TRIGGER reject_alerts BEFORE INSERT ON alerts \
             BEGIN SELECT RAISE(ABORT, 'alerts unavailable'); END;",
        )
        .await
        .unwrap();

        let (check, changes, draft) = lost_check(id);
        assert!(repo
            .record_check(id, check, changes, Some(draft))
            .await
            .is_err());

        let stored = repo.get(id).await.unwrap().unwrap();
        assert_eq!(stored.status, BacklinkStatus::Active);
        assert!(stored.last_checked_at.is_none());
        assert_eq!(ctx.checks().count_for(id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_due_ids() {
        let (ctx, _dir) = setup().await;
        let repo = ctx.backlinks();

        let never = repo.create(&sample()).await.unwrap();

        let mut fresh = sample();
        fresh.last_checked_at = Some(Utc::now());
        let fresh = repo.create(&fresh).await.unwrap();

        let mut stale = sample();
        stale.last_checked_at = Some(Utc::now() - chrono::Duration::days(2));
        let stale = repo.create(&stale).await.unwrap();

        let due = repo.due_ids(Utc::now()).await.unwrap();
        assert!(due.contains(&never));
        assert!(due.contains(&stale));
        assert!(!due.contains(&fresh));
    }
}
