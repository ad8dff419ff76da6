//! Database context for managing the connection pool and repository access.

use std::path::Path;

use diesel_async::SimpleAsyncConnection;

use super::alert::AlertRepository;
use super::backlink::BacklinkRepository;
use super::check::CheckRepository;
use super::pool::{DbError, DbPool};
use super::user::UserRepository;

/// Entry point for database operations.
///
/// Create one context per command or service, then use it to access all
/// repositories.
///
/// # Example
/// ```ignore
/// let ctx = DbContext::new(&db_path);
/// ctx.init_schema().await?;
/// let links = ctx.backlinks().list(None).await?;
/// ```
#[derive(Clone)]
pub struct DbContext {
    pool: DbPool,
}

impl DbContext {
    /// Create a context for a SQLite file.
    pub fn new(db_path: &Path) -> Self {
        Self {
            pool: DbPool::from_path(db_path),
        }
    }

    /// Create a context from a database URL (`sqlite:path` or a plain path).
    pub fn from_url(database_url: &str) -> Self {
        Self {
            pool: DbPool::new(database_url),
        }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn users(&self) -> UserRepository {
        UserRepository::new(self.pool.clone())
    }

    pub fn backlinks(&self) -> BacklinkRepository {
        BacklinkRepository::new(self.pool.clone())
    }

    pub fn checks(&self) -> CheckRepository {
        CheckRepository::new(self.pool.clone())
    }

    pub fn alerts(&self) -> AlertRepository {
        AlertRepository::new(self.pool.clone())
    }

    /// Create all tables if they don't exist.
    pub async fn init_schema(&self) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        conn.batch_execute(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL,
                name TEXT NOT NULL,
                email_alerts_enabled INTEGER NOT NULL DEFAULT 1,
                http_timeout INTEGER NOT NULL DEFAULT 30,
                check_frequency TEXT NOT NULL DEFAULT 'daily',
                webhook_url TEXT,
                webhook_secret TEXT,
                webhook_events TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS backlinks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_by INTEGER,
                source_url TEXT NOT NULL,
                target_url TEXT NOT NULL,
                anchor_text TEXT,
                rel_attributes TEXT,
                is_dofollow INTEGER NOT NULL DEFAULT 1,
                http_status INTEGER,
                status TEXT NOT NULL DEFAULT 'active',
                last_checked_at TEXT,
                first_seen_at TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (created_by) REFERENCES users(id) ON DELETE SET NULL
            );

            CREATE TABLE IF NOT EXISTS backlink_checks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                backlink_id INTEGER NOT NULL,
                checked_at TEXT NOT NULL,
                http_status INTEGER,
                is_present INTEGER NOT NULL,
                anchor_text TEXT,
                rel_attributes TEXT,
                error_message TEXT,
                FOREIGN KEY (backlink_id) REFERENCES backlinks(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS alerts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                backlink_id INTEGER NOT NULL,
                alert_type TEXT NOT NULL,
                severity TEXT NOT NULL,
                title TEXT NOT NULL,
                message TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                is_read INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                FOREIGN KEY (backlink_id) REFERENCES backlinks(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_backlinks_status ON backlinks(status);
            CREATE INDEX IF NOT EXISTS idx_checks_backlink ON backlink_checks(backlink_id, checked_at);
            CREATE INDEX IF NOT EXISTS idx_alerts_backlink ON alerts(backlink_id);
            CREATE INDEX IF NOT EXISTS idx_alerts_unread ON alerts(is_read);
            "#,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_init_schema_is_idempotent() {
        let dir = tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();
        ctx.init_schema().await.unwrap();
        assert!(ctx.backlinks().list(None).await.unwrap().is_empty());
    }
}
