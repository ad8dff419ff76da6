//! Repository layer for database persistence.
//!
//! All database access uses Diesel ORM with compile-time query checking
//! against a SQLite database.

pub mod alert;
pub mod backlink;
pub mod check;
pub mod context;
pub mod models;
pub mod pool;
pub mod user;
pub mod util;

pub use alert::{AlertDraft, AlertRepository};
pub use backlink::{BacklinkChangeset, BacklinkRepository, RecordedCheck};
pub use check::CheckRepository;
pub use context::DbContext;
pub use models::NewBacklinkCheck;
pub use pool::{DbError, DbPool};
pub use user::UserRepository;
pub use util::{parse_datetime, parse_datetime_opt};
