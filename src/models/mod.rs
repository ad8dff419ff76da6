//! Data models for linkwatch.

mod alert;
mod backlink;
mod check;
mod user;

pub use alert::{Alert, AlertSeverity, AlertType};
pub use backlink::{Backlink, BacklinkStatus};
pub use check::BacklinkCheck;
pub use user::{
    clamp_http_timeout, CheckFrequency, NotificationProfile, User, WebhookConfig,
    DEFAULT_HTTP_TIMEOUT_SECS, MAX_HTTP_TIMEOUT_SECS, MIN_HTTP_TIMEOUT_SECS,
};
