//! User management commands.

use anyhow::bail;
use console::style;

use crate::cli::helpers::{open_context, truncate};
use crate::config::Settings;
use crate::models::{clamp_http_timeout, AlertType, CheckFrequency, User};

pub struct NewUserArgs {
    pub email: String,
    pub name: Option<String>,
    pub timeout: Option<u64>,
    pub frequency: Option<CheckFrequency>,
    pub email_alerts: bool,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
    pub events: Vec<String>,
}

pub struct UserChanges {
    pub timeout: Option<u64>,
    pub frequency: Option<CheckFrequency>,
    pub email_alerts: Option<bool>,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
    pub events: Option<Vec<String>>,
    pub clear_webhook: bool,
}

/// Validate webhook event names; "all" (or nothing) means every type.
fn parse_events(events: &[String]) -> anyhow::Result<Vec<String>> {
    let events: Vec<String> = events
        .iter()
        .map(|e| e.trim().to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect();
    if events.iter().any(|e| e == "all") {
        return Ok(Vec::new());
    }
    for event in &events {
        if AlertType::from_str(event).is_none() {
            bail!(
                "Unknown event '{}'. Expected backlink_lost, backlink_changed or backlink_recovered",
                event
            );
        }
    }
    Ok(events)
}

pub async fn cmd_user_add(settings: &Settings, args: NewUserArgs) -> anyhow::Result<()> {
    let ctx = open_context(settings).await?;

    let name = args
        .name
        .unwrap_or_else(|| args.email.split('@').next().unwrap_or_default().to_string());
    let mut user = User::new(args.email, name);
    if let Some(timeout) = args.timeout {
        user.http_timeout = clamp_http_timeout(timeout);
    }
    if let Some(frequency) = args.frequency {
        user.check_frequency = frequency;
    }
    user.email_alerts_enabled = args.email_alerts;
    user.webhook_url = args.webhook_url;
    user.webhook_secret = args.webhook_secret;
    user.webhook_events = parse_events(&args.events)?;

    let id = ctx.users().create(&user).await?;
    println!(
        "{} Added user {} ({})",
        style("✓").green(),
        id,
        user.email
    );
    Ok(())
}

pub async fn cmd_user_list(settings: &Settings) -> anyhow::Result<()> {
    let ctx = open_context(settings).await?;
    let users = ctx.users().list().await?;

    if users.is_empty() {
        println!("{} No users. Add one with 'linkwatch user add'.", style("!").yellow());
        return Ok(());
    }

    println!("\n{}", style("Users").bold());
    println!("{}", "-".repeat(78));
    println!(
        "{:<5} {:<30} {:<8} {:<8} {:<7} Webhook",
        "ID", "Email", "Emails", "Every", "Timeout"
    );
    println!("{}", "-".repeat(78));

    for user in users {
        let webhook = match &user.webhook_url {
            Some(url) if user.webhook_events.is_empty() => truncate(url, 30),
            Some(url) => format!("{} [{}]", truncate(url, 24), user.webhook_events.join(",")),
            None => "-".to_string(),
        };
        println!(
            "{:<5} {:<30} {:<8} {:<8} {:<7} {}",
            user.id,
            truncate(&user.email, 29),
            if user.email_alerts_enabled { "on" } else { "off" },
            user.check_frequency.as_str(),
            format!("{}s", user.http_timeout),
            webhook
        );
    }

    Ok(())
}

pub async fn cmd_user_set(settings: &Settings, id: i32, changes: UserChanges) -> anyhow::Result<()> {
    let ctx = open_context(settings).await?;
    let repo = ctx.users();

    let Some(mut user) = repo.get(id).await? else {
        bail!("User {} not found", id);
    };

    if let Some(timeout) = changes.timeout {
        user.http_timeout = clamp_http_timeout(timeout);
    }
    if let Some(frequency) = changes.frequency {
        user.check_frequency = frequency;
    }
    if let Some(enabled) = changes.email_alerts {
        user.email_alerts_enabled = enabled;
    }
    if changes.clear_webhook {
        user.webhook_url = None;
        user.webhook_secret = None;
        user.webhook_events.clear();
    }
    if let Some(url) = changes.webhook_url {
        user.webhook_url = Some(url);
    }
    if let Some(secret) = changes.webhook_secret {
        user.webhook_secret = Some(secret);
    }
    if let Some(events) = changes.events {
        user.webhook_events = parse_events(&events)?;
    }

    repo.update_preferences(&user).await?;
    println!("{} Updated user {}", style("✓").green(), id);
    Ok(())
}
