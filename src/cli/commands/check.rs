//! Check commands.

use std::time::Duration;

use chrono::Utc;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use crate::cli::helpers::{build_monitor, open_context, styled_status, truncate};
use crate::config::Settings;
use crate::rate_limit::ManualCheckQuota;
use crate::services::{CheckEvent, CheckRunner, MonitorError, MonitorOutcome};

fn print_outcome(outcome: &MonitorOutcome) {
    let link = &outcome.backlink;
    let mark = if outcome.result.is_present {
        style("✓").green()
    } else {
        style("✗").red()
    };
    let transition = if outcome.status_changed() {
        format!(
            "{} → {}",
            outcome.previous_status,
            styled_status(outcome.status())
        )
    } else {
        styled_status(outcome.status())
    };
    println!(
        "{} [{}] {} ({})",
        mark,
        link.id,
        truncate(&link.source_url, 60),
        transition
    );

    if outcome.result.is_present {
        println!(
            "    anchor: {}  rel: {}  dofollow: {}",
            outcome.result.anchor_text.as_deref().unwrap_or("-"),
            outcome.result.rel_attributes.as_deref().unwrap_or("-"),
            if outcome.result.is_dofollow == Some(false) {
                "no"
            } else {
                "yes"
            }
        );
    } else if let Some(message) = &outcome.result.error_message {
        println!("    {}", style(message).dim());
    }

    if let Some(report) = &outcome.alert {
        println!(
            "    {} alert: {} [{}]{}{}",
            style("!").yellow(),
            report.alert.alert_type,
            report.alert.severity.label(),
            if report.email_sent { " emailed" } else { "" },
            if report.webhook_sent { " webhook" } else { "" }
        );
    }
}

/// Check specific backlinks now.
///
/// With `--as-user`, each check consumes one slot of that user's manual
/// quota; once exhausted the remaining ids are refused, not queued.
pub async fn cmd_check(
    settings: &Settings,
    ids: &[i32],
    as_user: Option<i32>,
    timeout: Option<u64>,
) -> anyhow::Result<()> {
    let ctx = open_context(settings).await?;
    let monitor = build_monitor(settings, &ctx);
    let quota = ManualCheckQuota::new(settings.manual_checks_per_minute);

    let mut failures = 0;
    for &id in ids {
        if let Some(user_id) = as_user {
            if let Err(e) = quota.try_acquire(user_id).await {
                println!("{} [{}] {}", style("✗").red(), id, e);
                failures += 1;
                continue;
            }
        }

        let result = match timeout {
            Some(secs) => monitor.run_with_timeout(id, Duration::from_secs(secs)).await,
            None => monitor.run(id).await,
        };
        match result {
            Ok(outcome) => print_outcome(&outcome),
            Err(e @ MonitorError::BacklinkNotFound(_)) => {
                println!("{} [{}] {}", style("✗").red(), id, e);
                failures += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} checks did not run", failures, ids.len());
    }
    Ok(())
}

/// Check all (or all due) backlinks with a worker pool.
pub async fn cmd_check_all(settings: &Settings, due: bool, workers: usize) -> anyhow::Result<()> {
    let ctx = open_context(settings).await?;
    let ids: Vec<i32> = if due {
        ctx.backlinks().due_ids(Utc::now()).await?
    } else {
        ctx.backlinks()
            .list(None)
            .await?
            .into_iter()
            .map(|b| b.id)
            .collect()
    };

    if ids.is_empty() {
        println!("{} Nothing to check.", style("!").yellow());
        return Ok(());
    }

    let pb = ProgressBar::new(ids.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let (event_tx, mut event_rx) = mpsc::channel::<CheckEvent>(100);
    let progress = pb.clone();
    let events = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                CheckEvent::Started { backlink_id, .. } => {
                    progress.set_message(format!("checking {}", backlink_id));
                }
                CheckEvent::Finished {
                    backlink_id,
                    previous,
                    status,
                    ..
                } => {
                    if previous != status {
                        progress.println(format!(
                            "  [{}] {} → {}",
                            backlink_id,
                            previous,
                            styled_status(status)
                        ));
                    }
                    progress.inc(1);
                }
                CheckEvent::Failed {
                    backlink_id, error, ..
                } => {
                    progress.println(format!("  {} [{}] {}", style("✗").red(), backlink_id, error));
                    progress.inc(1);
                }
            }
        }
    });

    let runner = CheckRunner::new(build_monitor(settings, &ctx), workers);
    let summary = runner.run(ids, event_tx).await;
    let _ = events.await;
    pb.finish_and_clear();

    println!("\n{}", style("Check summary").bold());
    println!("  Checked: {}", summary.checked);
    println!("  Present: {}", summary.present);
    println!("  Changed: {}", summary.changed);
    println!("  Lost:    {}", summary.lost);
    println!("  Alerts:  {}", summary.alerts);
    if summary.failed > 0 {
        println!("  {} {}", style("Failed:").red(), summary.failed);
    }

    Ok(())
}
