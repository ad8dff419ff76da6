//! Repository utilities.

use chrono::{DateTime, Utc};
use diesel::result::DatabaseErrorInformation;

/// Simple error info wrapper for database errors.
#[derive(Debug)]
pub struct DbErrorInfo(pub String);

impl DatabaseErrorInformation for DbErrorInfo {
    fn message(&self) -> &str {
        &self.0
    }
    fn details(&self) -> Option<&str> {
        None
    }
    fn hint(&self) -> Option<&str> {
        None
    }
    fn table_name(&self) -> Option<&str> {
        None
    }
    fn column_name(&self) -> Option<&str> {
        None
    }
    fn constraint_name(&self) -> Option<&str> {
        None
    }
    fn statement_position(&self) -> Option<i32> {
        None
    }
}

/// Convert any displayable error to a diesel error with proper message.
pub fn to_diesel_error(e: impl std::fmt::Display) -> diesel::result::Error {
    diesel::result::Error::DatabaseError(
        diesel::result::DatabaseErrorKind::Unknown,
        Box::new(DbErrorInfo(e.to_string())),
    )
}

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse an optional datetime string from the database.
pub fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}

/// SQLite stores booleans as INTEGER.
pub fn bool_to_int(b: bool) -> i32 {
    i32::from(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_datetime_fallback() {
        assert_eq!(parse_datetime("not a date"), DateTime::UNIX_EPOCH);
        let dt = parse_datetime("2024-05-01T10:00:00+00:00");
        assert_eq!(dt.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }

    #[test]
    fn test_parse_datetime_opt() {
        assert!(parse_datetime_opt(None).is_none());
        assert!(parse_datetime_opt(Some("garbage".into())).is_none());
        assert!(parse_datetime_opt(Some("2024-05-01T10:00:00Z".into())).is_some());
    }
}
