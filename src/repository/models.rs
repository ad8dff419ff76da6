//! Diesel ORM models for database tables.
//!
//! Records mirror the SQLite column types: timestamps are RFC 3339 text and
//! booleans are integers. Conversion to domain models lives with each
//! repository.

use diesel::prelude::*;

use crate::schema;

/// User record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct UserRecord {
    pub id: i32,
    pub email: String,
    pub name: String,
    pub email_alerts_enabled: i32,
    pub http_timeout: i32,
    pub check_frequency: String,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
    pub webhook_events: String,
    pub created_at: String,
}

/// New user for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::users)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub name: &'a str,
    pub email_alerts_enabled: i32,
    pub http_timeout: i32,
    pub check_frequency: &'a str,
    pub webhook_url: Option<&'a str>,
    pub webhook_secret: Option<&'a str>,
    pub webhook_events: &'a str,
    pub created_at: &'a str,
}

/// Backlink record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::backlinks)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct BacklinkRecord {
    pub id: i32,
    pub created_by: Option<i32>,
    pub source_url: String,
    pub target_url: String,
    pub anchor_text: Option<String>,
    pub rel_attributes: Option<String>,
    pub is_dofollow: i32,
    pub http_status: Option<i32>,
    pub status: String,
    pub last_checked_at: Option<String>,
    pub first_seen_at: String,
    pub created_at: String,
}

/// New backlink for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::backlinks)]
pub struct NewBacklink<'a> {
    pub created_by: Option<i32>,
    pub source_url: &'a str,
    pub target_url: &'a str,
    pub anchor_text: Option<&'a str>,
    pub rel_attributes: Option<&'a str>,
    pub is_dofollow: i32,
    pub http_status: Option<i32>,
    pub status: &'a str,
    pub last_checked_at: Option<&'a str>,
    pub first_seen_at: &'a str,
    pub created_at: &'a str,
}

/// Check record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::backlink_checks)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct BacklinkCheckRecord {
    pub id: i32,
    pub backlink_id: i32,
    pub checked_at: String,
    pub http_status: Option<i32>,
    pub is_present: i32,
    pub anchor_text: Option<String>,
    pub rel_attributes: Option<String>,
    pub error_message: Option<String>,
}

/// New check for insertion.
#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = schema::backlink_checks)]
pub struct NewBacklinkCheck {
    pub backlink_id: i32,
    pub checked_at: String,
    pub http_status: Option<i32>,
    pub is_present: i32,
    pub anchor_text: Option<String>,
    pub rel_attributes: Option<String>,
    pub error_message: Option<String>,
}

/// Alert record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::alerts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AlertRecord {
    pub id: i32,
    pub backlink_id: i32,
    pub alert_type: String,
    pub severity: String,
    pub title: String,
    pub message: String,
    pub metadata: String,
    pub is_read: i32,
    pub created_at: String,
}

/// New alert for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::alerts)]
pub struct NewAlert<'a> {
    pub backlink_id: i32,
    pub alert_type: &'a str,
    pub severity: &'a str,
    pub title: &'a str,
    pub message: &'a str,
    pub metadata: &'a str,
    pub is_read: i32,
    pub created_at: &'a str,
}

/// Result of `SELECT last_insert_rowid()`.
#[derive(QueryableByName)]
pub(crate) struct LastInsertRowId {
    #[diesel(sql_type = diesel::sql_types::BigInt, column_name = "last_insert_rowid()")]
    pub id: i64,
}
