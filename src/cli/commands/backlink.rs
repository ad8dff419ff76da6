//! Backlink management commands.

use anyhow::{bail, Context};
use chrono::{Duration, Utc};
use console::style;
use url::Url;

use crate::checker::url_guard::literal_rejection;
use crate::cli::helpers::{format_datetime, open_context, styled_status, truncate};
use crate::config::Settings;
use crate::models::{Backlink, BacklinkStatus};

/// Window used for the uptime figure in `backlink show`.
const UPTIME_WINDOW_DAYS: i64 = 30;

pub async fn cmd_backlink_add(
    settings: &Settings,
    source_url: &str,
    target_url: &str,
    owner: Option<i32>,
    anchor: Option<String>,
) -> anyhow::Result<()> {
    let source = Url::parse(source_url.trim())
        .with_context(|| format!("Invalid source URL '{}'", source_url))?;
    if let Some(reason) = literal_rejection(&source) {
        bail!("Refusing to track {}: {}", source_url, reason);
    }
    if target_url.trim().is_empty() {
        bail!("Target URL must not be empty");
    }

    let ctx = open_context(settings).await?;
    if let Some(owner) = owner {
        if ctx.users().get(owner).await?.is_none() {
            bail!("User {} not found", owner);
        }
    }

    let mut backlink = Backlink::new(source.to_string(), target_url.trim().to_string(), owner);
    backlink.anchor_text = anchor.filter(|a| !a.trim().is_empty());
    let id = ctx.backlinks().create(&backlink).await?;

    println!(
        "{} Tracking backlink {}: {} → {}",
        style("✓").green(),
        id,
        backlink.source_url,
        backlink.target_url
    );
    Ok(())
}

pub async fn cmd_backlink_list(
    settings: &Settings,
    status: Option<BacklinkStatus>,
) -> anyhow::Result<()> {
    let ctx = open_context(settings).await?;
    let backlinks = ctx.backlinks().list(status).await?;

    if backlinks.is_empty() {
        println!("{} No backlinks tracked.", style("!").yellow());
        return Ok(());
    }

    println!("\n{}", style("Backlinks").bold());
    println!("{}", "-".repeat(100));
    println!(
        "{:<5} {:<40} {:<28} {:<8} {:<6} Last Checked",
        "ID", "Source", "Target", "Status", "HTTP"
    );
    println!("{}", "-".repeat(100));

    for link in backlinks {
        println!(
            "{:<5} {:<40} {:<28} {:<8} {:<6} {}",
            link.id,
            truncate(&link.source_url, 39),
            truncate(&link.target_url, 27),
            styled_status(link.status),
            link.http_status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string()),
            format_datetime(link.last_checked_at)
        );
    }

    Ok(())
}

pub async fn cmd_backlink_show(settings: &Settings, id: i32, limit: i64) -> anyhow::Result<()> {
    let ctx = open_context(settings).await?;
    let Some(link) = ctx.backlinks().get(id).await? else {
        bail!("Backlink {} not found", id);
    };

    println!("\n{} {}", style("Backlink").bold(), link.id);
    println!("  Source:       {}", link.source_url);
    println!("  Target:       {}", link.target_url);
    println!("  Status:       {}", styled_status(link.status));
    println!(
        "  Anchor:       {}",
        link.anchor_text.as_deref().unwrap_or("-")
    );
    println!(
        "  Rel:          {}",
        link.rel_attributes.as_deref().unwrap_or("-")
    );
    println!(
        "  Dofollow:     {}",
        if link.is_dofollow { "yes" } else { "no" }
    );
    println!("  First seen:   {}", format_datetime(Some(link.first_seen_at)));
    println!("  Last checked: {}", format_datetime(link.last_checked_at));

    let since = Utc::now() - Duration::days(UPTIME_WINDOW_DAYS);
    match ctx.checks().uptime(id, since).await? {
        Some(pct) => println!("  Uptime ({}d):  {:.1}%", UPTIME_WINDOW_DAYS, pct),
        None => println!("  Uptime ({}d):  no checks", UPTIME_WINDOW_DAYS),
    }

    let checks = ctx.checks().recent(id, limit).await?;
    if !checks.is_empty() {
        println!("\n{}", style("Recent checks").bold());
        for check in checks {
            let mark = if check.is_present {
                style("✓").green()
            } else {
                style("✗").red()
            };
            let detail = check
                .error_message
                .or(check.anchor_text)
                .unwrap_or_default();
            println!(
                "  {} {} {:<4} {}",
                mark,
                format_datetime(Some(check.checked_at)),
                check
                    .http_status
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                truncate(&detail, 60)
            );
        }
    }

    let alerts = ctx.alerts().for_backlink(id).await?;
    if !alerts.is_empty() {
        println!("\n{}", style("Alerts").bold());
        for alert in alerts.iter().rev().take(limit.max(0) as usize) {
            println!(
                "  {} [{}] {}{}",
                format_datetime(Some(alert.created_at)),
                alert.severity.label(),
                alert.title,
                if alert.is_read { "" } else { " (unread)" }
            );
        }
    }

    Ok(())
}

pub async fn cmd_backlink_remove(settings: &Settings, id: i32) -> anyhow::Result<()> {
    let ctx = open_context(settings).await?;
    if ctx.backlinks().delete(id).await? {
        println!("{} Removed backlink {}", style("✓").green(), id);
        Ok(())
    } else {
        bail!("Backlink {} not found", id)
    }
}

/// Show backlink counts by status.
pub async fn cmd_status(settings: &Settings) -> anyhow::Result<()> {
    let ctx = open_context(settings).await?;
    let counts = ctx.backlinks().count_by_status().await?;
    let unread = ctx.alerts().count_unread().await?;

    println!("\n{}", style("Linkwatch Status").bold());
    println!("{}", "-".repeat(30));
    for status in [
        BacklinkStatus::Active,
        BacklinkStatus::Changed,
        BacklinkStatus::Lost,
    ] {
        println!(
            "  {:<10} {}",
            styled_status(status),
            counts.get(&status).copied().unwrap_or(0)
        );
    }
    println!("  {:<10} {}", "unread", unread);
    println!("\n  Database: {}", settings.database_url());

    Ok(())
}
