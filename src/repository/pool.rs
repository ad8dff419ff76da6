//! Database connection pool for SQLite.
//!
//! Uses diesel-async's SyncConnectionWrapper to provide an async interface
//! for SQLite. SQLite connections are lightweight, so a new connection is
//! established per request rather than pooled.

use std::path::Path;

use diesel::sqlite::SqliteConnection;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::{AsyncConnection, SimpleAsyncConnection};

use super::util::to_diesel_error;

/// Diesel error type alias.
pub type DbError = diesel::result::Error;

/// Async SQLite connection type.
pub type SqliteConn = SyncConnectionWrapper<SqliteConnection>;

/// SQLite connection factory.
#[derive(Clone, Debug)]
pub struct DbPool {
    database_url: String,
}

impl DbPool {
    /// Create a pool from a database URL or file path.
    ///
    /// A leading `sqlite://` or `sqlite:` prefix is accepted and stripped.
    pub fn new(database_url: &str) -> Self {
        let url = database_url
            .strip_prefix("sqlite://")
            .or_else(|| database_url.strip_prefix("sqlite:"))
            .unwrap_or(database_url);
        Self {
            database_url: url.to_string(),
        }
    }

    /// Create pool from a file path.
    pub fn from_path(path: &Path) -> Self {
        Self::new(&path.display().to_string())
    }

    /// Get a connection with foreign key enforcement enabled.
    pub async fn get(&self) -> Result<SqliteConn, DbError> {
        let mut conn = SqliteConn::establish(&self.database_url)
            .await
            .map_err(to_diesel_error)?;
        conn.batch_execute("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
            .await?;
        Ok(conn)
    }

    /// Get the database URL.
    pub fn database_url(&self) -> &str {
        &self.database_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_prefix_stripped() {
        assert_eq!(DbPool::new("sqlite:/tmp/x.db").database_url(), "/tmp/x.db");
        assert_eq!(DbPool::new("sqlite:///tmp/z.db").database_url(), "/tmp/z.db");
        assert_eq!(DbPool::new("/tmp/y.db").database_url(), "/tmp/y.db");
    }
}
