//! Users and their notification preferences.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AlertType;

/// Default per-user HTTP timeout in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
/// Lower bound accepted for `http_timeout`.
pub const MIN_HTTP_TIMEOUT_SECS: u64 = 5;
/// Upper bound accepted for `http_timeout`.
pub const MAX_HTTP_TIMEOUT_SECS: u64 = 120;

/// Clamp a configured timeout into the supported 5-120s range.
pub fn clamp_http_timeout(secs: u64) -> u64 {
    secs.clamp(MIN_HTTP_TIMEOUT_SECS, MAX_HTTP_TIMEOUT_SECS)
}

/// How often the scheduler should re-check a user's backlinks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckFrequency {
    Hourly,
    #[default]
    Daily,
    Weekly,
}

impl CheckFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "hourly" => Some(Self::Hourly),
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            _ => None,
        }
    }

    /// Minimum time between two scheduled checks.
    pub fn interval(&self) -> chrono::Duration {
        match self {
            Self::Hourly => chrono::Duration::hours(1),
            Self::Daily => chrono::Duration::days(1),
            Self::Weekly => chrono::Duration::weeks(1),
        }
    }
}

/// A user account as seen by the monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i32,
    pub email: String,
    pub name: String,
    pub email_alerts_enabled: bool,
    /// Fetch timeout in seconds (5-120).
    pub http_timeout: u64,
    pub check_frequency: CheckFrequency,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
    /// Subscribed alert types. Empty means all.
    pub webhook_events: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: String, name: String) -> Self {
        Self {
            id: 0,
            email,
            name,
            email_alerts_enabled: true,
            http_timeout: DEFAULT_HTTP_TIMEOUT_SECS,
            check_frequency: CheckFrequency::default(),
            webhook_url: None,
            webhook_secret: None,
            webhook_events: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Effective fetch timeout for this user's checks.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(clamp_http_timeout(self.http_timeout))
    }

    /// Read-only projection handed to the alert dispatcher.
    pub fn notification_profile(&self) -> NotificationProfile {
        NotificationProfile {
            user_id: self.id,
            email: self.email.clone(),
            email_alerts_enabled: self.email_alerts_enabled,
            webhook: self.webhook_url.as_ref().map(|url| WebhookConfig {
                url: url.clone(),
                secret: self.webhook_secret.clone(),
                events: self.webhook_events.clone(),
            }),
        }
    }
}

/// Webhook endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    pub secret: Option<String>,
    pub events: Vec<String>,
}

impl WebhookConfig {
    /// Whether this endpoint subscribed to the given alert type.
    pub fn wants(&self, alert_type: AlertType) -> bool {
        self.events.is_empty() || self.events.iter().any(|e| e == alert_type.as_str())
    }
}

/// Notification preferences of a backlink's owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationProfile {
    pub user_id: i32,
    pub email: String,
    pub email_alerts_enabled: bool,
    pub webhook: Option<WebhookConfig>,
}
