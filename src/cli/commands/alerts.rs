//! Alert commands.

use anyhow::bail;
use console::style;

use crate::cli::helpers::{format_datetime, open_context, truncate};
use crate::config::Settings;
use crate::models::AlertSeverity;

pub async fn cmd_alerts_list(settings: &Settings, unread: bool, limit: i64) -> anyhow::Result<()> {
    let ctx = open_context(settings).await?;
    let alerts = ctx.alerts().list(unread, limit).await?;

    if alerts.is_empty() {
        println!("{} No alerts.", style("!").yellow());
        return Ok(());
    }

    for alert in alerts {
        let label = style(alert.severity.label());
        let severity = match alert.severity {
            AlertSeverity::Critical => label.red().bold(),
            AlertSeverity::High => label.red(),
            AlertSeverity::Medium | AlertSeverity::Low => label.cyan(),
        };
        println!(
            "{} {:<5} {} [{}] {} (backlink {})",
            if alert.is_read { " " } else { "*" },
            alert.id,
            format_datetime(Some(alert.created_at)),
            severity,
            alert.title,
            alert.backlink_id
        );
        println!("        {}", truncate(&alert.message, 100));
    }

    Ok(())
}

pub async fn cmd_alerts_read(settings: &Settings, id: i32) -> anyhow::Result<()> {
    let ctx = open_context(settings).await?;
    if ctx.alerts().mark_read(id).await? {
        println!("{} Marked alert {} as read", style("✓").green(), id);
        Ok(())
    } else {
        bail!("Alert {} not found", id)
    }
}
