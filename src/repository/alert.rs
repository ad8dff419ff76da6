//! Alert repository.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::{AlertRecord, LastInsertRowId, NewAlert};
use super::pool::{DbError, DbPool, SqliteConn};
use super::util::parse_datetime;
use crate::models::{Alert, AlertSeverity, AlertType};
use crate::schema::alerts;

impl TryFrom<AlertRecord> for Alert {
    type Error = DbError;

    fn try_from(record: AlertRecord) -> Result<Self, Self::Error> {
        let alert_type = AlertType::from_str(&record.alert_type).ok_or_else(|| {
            super::util::to_diesel_error(format!("unknown alert type '{}'", record.alert_type))
        })?;
        Ok(Alert {
            id: record.id,
            backlink_id: record.backlink_id,
            alert_type,
            severity: AlertSeverity::from_str(&record.severity)
                .unwrap_or_else(|| alert_type.severity()),
            title: record.title,
            message: record.message,
            metadata: serde_json::from_str(&record.metadata).unwrap_or_default(),
            is_read: record.is_read != 0,
            created_at: parse_datetime(&record.created_at),
        })
    }
}

/// Fields of an alert about to be created.
#[derive(Debug, Clone)]
pub struct AlertDraft {
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub metadata: serde_json::Value,
}

/// Insert an unread alert on an existing connection.
///
/// Lets the check transaction create its alert atomically with the status
/// change that raised it.
pub(super) async fn insert_alert(
    conn: &mut SqliteConn,
    backlink_id: i32,
    draft: &AlertDraft,
) -> Result<Alert, DbError> {
    let created_at = Utc::now();
    let created_at_str = created_at.to_rfc3339();
    let metadata = serde_json::to_string(&draft.metadata).unwrap_or_else(|_| "{}".to_string());

    diesel::insert_into(alerts::table)
        .values(NewAlert {
            backlink_id,
            alert_type: draft.alert_type.as_str(),
            severity: draft.severity.as_str(),
            title: &draft.title,
            message: &draft.message,
            metadata: &metadata,
            is_read: 0,
            created_at: &created_at_str,
        })
        .execute(conn)
        .await?;

    let row: LastInsertRowId = diesel::sql_query("SELECT last_insert_rowid()")
        .get_result(conn)
        .await?;

    Ok(Alert {
        id: row.id as i32,
        backlink_id,
        alert_type: draft.alert_type,
        severity: draft.severity,
        title: draft.title.clone(),
        message: draft.message.clone(),
        metadata: draft.metadata.clone(),
        is_read: false,
        created_at,
    })
}

/// Alert repository.
#[derive(Clone)]
pub struct AlertRepository {
    pool: DbPool,
}

impl AlertRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Persist a new unread alert.
    pub async fn create(&self, backlink_id: i32, draft: &AlertDraft) -> Result<Alert, DbError> {
        let mut conn = self.pool.get().await?;
        insert_alert(&mut conn, backlink_id, draft).await
    }

    /// List alerts, newest first.
    pub async fn list(&self, unread_only: bool, limit: i64) -> Result<Vec<Alert>, DbError> {
        let mut conn = self.pool.get().await?;

        let mut query = alerts::table
            .order(alerts::id.desc())
            .limit(limit)
            .into_boxed();
        if unread_only {
            query = query.filter(alerts::is_read.eq(0));
        }

        let records = query.load::<AlertRecord>(&mut conn).await?;
        records.into_iter().map(Alert::try_from).collect()
    }

    /// Number of unread alerts.
    pub async fn count_unread(&self) -> Result<i64, DbError> {
        let mut conn = self.pool.get().await?;

        alerts::table
            .filter(alerts::is_read.eq(0))
            .count()
            .get_result(&mut conn)
            .await
    }

    /// All alerts raised for one backlink, oldest first.
    pub async fn for_backlink(&self, backlink_id: i32) -> Result<Vec<Alert>, DbError> {
        let mut conn = self.pool.get().await?;

        let records = alerts::table
            .filter(alerts::backlink_id.eq(backlink_id))
            .order(alerts::id.asc())
            .load::<AlertRecord>(&mut conn)
            .await?;
        records.into_iter().map(Alert::try_from).collect()
    }

    /// Mark an alert as read. Returns false if it does not exist.
    pub async fn mark_read(&self, id: i32) -> Result<bool, DbError> {
        let mut conn = self.pool.get().await?;

        let rows = diesel::update(alerts::table.find(id))
            .set(alerts::is_read.eq(1))
            .execute(&mut conn)
            .await?;

        Ok(rows > 0)
    }
}
