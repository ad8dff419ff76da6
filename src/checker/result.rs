//! Outcome of a single backlink check.

use serde::Serialize;

use super::anchor::AnchorMatch;

/// Message recorded when the page loaded but carried no matching link.
pub const NOT_FOUND_MESSAGE: &str = "Backlink not found in page";

/// How a check ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    /// Page loaded and links to the target.
    Found,
    /// Page loaded without a matching link.
    NotFound,
    /// Server answered with a non-2xx status.
    HttpError,
    /// Network failure: DNS, connect, timeout, TLS, oversized body.
    Transport,
    /// Source URL refused before any request was made.
    Blocked,
}

impl CheckOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Found => "found",
            Self::NotFound => "not_found",
            Self::HttpError => "http_error",
            Self::Transport => "transport_error",
            Self::Blocked => "blocked",
        }
    }
}

/// Observations from one check. Never persisted directly; the monitor
/// turns it into a check row and a backlink update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub outcome: CheckOutcome,
    pub http_status: Option<i32>,
    pub is_present: bool,
    pub anchor_text: Option<String>,
    pub rel_attributes: Option<String>,
    /// Only meaningful when the link was found.
    pub is_dofollow: Option<bool>,
    pub error_message: Option<String>,
}

impl CheckResult {
    pub fn found(status: u16, anchor: AnchorMatch) -> Self {
        Self {
            outcome: CheckOutcome::Found,
            http_status: Some(i32::from(status)),
            is_present: true,
            is_dofollow: Some(anchor.is_dofollow()),
            rel_attributes: anchor.rel_attributes(),
            anchor_text: anchor.text,
            error_message: None,
        }
    }

    pub fn not_found(status: u16) -> Self {
        Self::absent(
            CheckOutcome::NotFound,
            Some(i32::from(status)),
            NOT_FOUND_MESSAGE.to_string(),
        )
    }

    pub fn http_error(status: u16) -> Self {
        Self::absent(
            CheckOutcome::HttpError,
            Some(i32::from(status)),
            format!("HTTP {}", status),
        )
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::absent(CheckOutcome::Transport, None, message.into())
    }

    pub fn blocked(message: impl Into<String>) -> Self {
        Self::absent(CheckOutcome::Blocked, None, message.into())
    }

    fn absent(outcome: CheckOutcome, http_status: Option<i32>, message: String) -> Self {
        Self {
            outcome,
            http_status,
            is_present: false,
            anchor_text: None,
            rel_attributes: None,
            is_dofollow: None,
            error_message: Some(message),
        }
    }

    /// Whether the source URL was refused by the SSRF guard.
    pub fn is_blocked(&self) -> bool {
        self.outcome == CheckOutcome::Blocked
    }
}
