//! User repository.

use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::{LastInsertRowId, NewUser, UserRecord};
use super::pool::{DbError, DbPool};
use super::util::{bool_to_int, parse_datetime};
use crate::models::{clamp_http_timeout, CheckFrequency, User};
use crate::schema::users;

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        User {
            id: record.id,
            email: record.email,
            name: record.name,
            email_alerts_enabled: record.email_alerts_enabled != 0,
            http_timeout: clamp_http_timeout(record.http_timeout.max(0) as u64),
            check_frequency: CheckFrequency::from_str(&record.check_frequency)
                .unwrap_or_default(),
            webhook_url: record.webhook_url.filter(|u| !u.is_empty()),
            webhook_secret: record.webhook_secret.filter(|s| !s.is_empty()),
            webhook_events: serde_json::from_str(&record.webhook_events).unwrap_or_default(),
            created_at: parse_datetime(&record.created_at),
        }
    }
}

/// User repository.
#[derive(Clone)]
pub struct UserRepository {
    pool: DbPool,
}

impl UserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert a new user and return its id.
    pub async fn create(&self, user: &User) -> Result<i32, DbError> {
        let mut conn = self.pool.get().await?;

        let events = serde_json::to_string(&user.webhook_events).unwrap_or_else(|_| "[]".into());
        let created_at = user.created_at.to_rfc3339();

        diesel::insert_into(users::table)
            .values(NewUser {
                email: &user.email,
                name: &user.name,
                email_alerts_enabled: bool_to_int(user.email_alerts_enabled),
                http_timeout: clamp_http_timeout(user.http_timeout) as i32,
                check_frequency: user.check_frequency.as_str(),
                webhook_url: user.webhook_url.as_deref(),
                webhook_secret: user.webhook_secret.as_deref(),
                webhook_events: &events,
                created_at: &created_at,
            })
            .execute(&mut conn)
            .await?;

        let row: LastInsertRowId = diesel::sql_query("SELECT last_insert_rowid()")
            .get_result(&mut conn)
            .await?;
        Ok(row.id as i32)
    }

    /// Get a user by id.
    pub async fn get(&self, id: i32) -> Result<Option<User>, DbError> {
        let mut conn = self.pool.get().await?;

        users::table
            .find(id)
            .first::<UserRecord>(&mut conn)
            .await
            .optional()
            .map(|opt| opt.map(User::from))
    }

    /// Get all users.
    pub async fn list(&self) -> Result<Vec<User>, DbError> {
        let mut conn = self.pool.get().await?;

        users::table
            .order(users::id.asc())
            .load::<UserRecord>(&mut conn)
            .await
            .map(|records| records.into_iter().map(User::from).collect())
    }

    /// Save notification and scheduling preferences.
    pub async fn update_preferences(&self, user: &User) -> Result<bool, DbError> {
        let mut conn = self.pool.get().await?;

        let events = serde_json::to_string(&user.webhook_events).unwrap_or_else(|_| "[]".into());

        let rows = diesel::update(users::table.find(user.id))
            .set((
                users::email_alerts_enabled.eq(bool_to_int(user.email_alerts_enabled)),
                users::http_timeout.eq(clamp_http_timeout(user.http_timeout) as i32),
                users::check_frequency.eq(user.check_frequency.as_str()),
                users::webhook_url.eq(user.webhook_url.as_deref()),
                users::webhook_secret.eq(user.webhook_secret.as_deref()),
                users::webhook_events.eq(&events),
            ))
            .execute(&mut conn)
            .await?;

        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::DbContext;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_user_preferences_roundtrip() {
        let dir = tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();
        let repo = ctx.users();

        let mut user = User::new("owner@example.com".into(), "Owner".into());
        user.http_timeout = 500;
        let id = repo.create(&user).await.unwrap();

        let mut stored = repo.get(id).await.unwrap().unwrap();
        assert_eq!(stored.http_timeout, 120);
        assert!(stored.webhook_events.is_empty());

        stored.email_alerts_enabled = false;
        stored.webhook_url = Some("https://hooks.example.com/in".into());
        stored.webhook_events = vec!["backlink_lost".into()];
        assert!(repo.update_preferences(&stored).await.unwrap());

        let reloaded = repo.get(id).await.unwrap().unwrap();
        assert!(!reloaded.email_alerts_enabled);
        assert_eq!(reloaded.webhook_events, vec!["backlink_lost".to_string()]);
        assert!(reloaded.notification_profile().webhook.is_some());
    }
}
