//! Alert events raised by backlink status transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of transition that raised an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    BacklinkLost,
    BacklinkChanged,
    BacklinkRecovered,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BacklinkLost => "backlink_lost",
            Self::BacklinkChanged => "backlink_changed",
            Self::BacklinkRecovered => "backlink_recovered",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "backlink_lost" => Some(Self::BacklinkLost),
            "backlink_changed" => Some(Self::BacklinkChanged),
            "backlink_recovered" => Some(Self::BacklinkRecovered),
            _ => None,
        }
    }

    /// Severity assigned to alerts of this type.
    pub fn severity(&self) -> AlertSeverity {
        match self {
            Self::BacklinkLost => AlertSeverity::Critical,
            Self::BacklinkChanged => AlertSeverity::High,
            Self::BacklinkRecovered => AlertSeverity::Low,
        }
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Whether alerts of this severity warrant an email.
    pub fn is_urgent(&self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }

    /// Uppercase label used in notification subjects.
    pub fn label(&self) -> String {
        self.as_str().to_uppercase()
    }
}

/// A persisted alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: i32,
    pub backlink_id: i32,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    /// Structured diff or context for the alert.
    pub metadata: serde_json::Value,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_type_roundtrip() {
        for t in [
            AlertType::BacklinkLost,
            AlertType::BacklinkChanged,
            AlertType::BacklinkRecovered,
        ] {
            assert_eq!(AlertType::from_str(t.as_str()), Some(t));
        }
    }

    #[test]
    fn test_severity_mapping() {
        assert_eq!(AlertType::BacklinkLost.severity(), AlertSeverity::Critical);
        assert_eq!(AlertType::BacklinkChanged.severity(), AlertSeverity::High);
        assert!(!AlertType::BacklinkRecovered.severity().is_urgent());
    }

    #[test]
    fn test_severity_label() {
        assert_eq!(AlertSeverity::Critical.label(), "CRITICAL");
        assert!(AlertSeverity::Critical > AlertSeverity::High);
    }
}
