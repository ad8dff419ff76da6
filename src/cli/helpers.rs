//! Shared helper functions for CLI commands.

use std::sync::Arc;

use anyhow::bail;
use chrono::{DateTime, Utc};
use console::style;

use crate::checker::{BacklinkChecker, UrlGuard};
use crate::config::Settings;
use crate::http_client::HttpFetcher;
use crate::models::BacklinkStatus;
use crate::repository::DbContext;
use crate::services::alerts::{AlertDispatcher, HttpWebhookDelivery};
use crate::services::BacklinkMonitor;

/// Open the database, failing with a hint when it was never initialized.
pub async fn open_context(settings: &Settings) -> anyhow::Result<DbContext> {
    if !settings.database_exists() {
        bail!(
            "No database at {}. Run 'linkwatch init' first.",
            settings.database_path().display()
        );
    }
    let ctx = settings.create_db_context();
    ctx.init_schema().await?;
    Ok(ctx)
}

/// Wire the production monitor from settings.
pub fn build_monitor(settings: &Settings, ctx: &DbContext) -> BacklinkMonitor {
    let guard = UrlGuard::system();
    let checker = BacklinkChecker::new(
        guard.clone(),
        Arc::new(HttpFetcher::new(guard.clone())),
        settings.checker_settings(),
    );
    let dispatcher = AlertDispatcher::new(
        ctx.alerts(),
        settings.build_mailer(),
        Arc::new(HttpWebhookDelivery::new(guard)),
    );
    BacklinkMonitor::new(ctx, checker, dispatcher)
}

/// Truncate a string to `max` characters, adding an ellipsis.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

pub fn format_datetime(dt: Option<DateTime<Utc>>) -> String {
    dt.map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "Never".to_string())
}

/// Status word colored for terminals.
pub fn styled_status(status: BacklinkStatus) -> String {
    match status {
        BacklinkStatus::Active => style(status.as_str()).green().to_string(),
        BacklinkStatus::Changed => style(status.as_str()).yellow().to_string(),
        BacklinkStatus::Lost => style(status.as_str()).red().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("https://example.com/long/path", 12), "https://e...");
        assert_eq!(truncate("ééééé", 4), "é...");
    }
}
