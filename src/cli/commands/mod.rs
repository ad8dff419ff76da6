//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod alerts;
mod backlink;
mod check;
mod init;
mod user;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions};
use crate::models::{BacklinkStatus, CheckFrequency};

#[derive(Parser)]
#[command(name = "linkwatch")]
#[command(about = "Verify that third-party pages still link to your site")]
#[command(version)]
pub struct Cli {
    /// Data directory or database file (overrides config file).
    /// Can be a directory containing linkwatch.db or a .db file directly.
    #[arg(long, short = 'd', global = true)]
    data: Option<PathBuf>,

    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Resolve relative paths from current working directory instead of config file location
    #[arg(long, global = true)]
    cwd: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

/// Frequency names accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum FrequencyArg {
    Hourly,
    Daily,
    Weekly,
}

impl From<FrequencyArg> for CheckFrequency {
    fn from(arg: FrequencyArg) -> Self {
        match arg {
            FrequencyArg::Hourly => CheckFrequency::Hourly,
            FrequencyArg::Daily => CheckFrequency::Daily,
            FrequencyArg::Weekly => CheckFrequency::Weekly,
        }
    }
}

/// Status names accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StatusArg {
    Active,
    Lost,
    Changed,
}

impl From<StatusArg> for BacklinkStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Active => BacklinkStatus::Active,
            StatusArg::Lost => BacklinkStatus::Lost,
            StatusArg::Changed => BacklinkStatus::Changed,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Manage users and their notification preferences
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Manage tracked backlinks
    Backlink {
        #[command(subcommand)]
        command: BacklinkCommands,
    },

    /// Check one or more backlinks now
    Check {
        /// Backlink IDs
        #[arg(required = true)]
        ids: Vec<i32>,
        /// Acting user; applies the per-user manual check quota
        #[arg(long)]
        as_user: Option<i32>,
        /// Timeout in seconds (overrides the owner's setting)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Check all backlinks (or only those due) with a worker pool
    CheckAll {
        /// Only check backlinks whose owner's check frequency has elapsed
        #[arg(long)]
        due: bool,
        /// Number of concurrent workers (default from config)
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Show alerts
    Alerts {
        #[command(subcommand)]
        command: AlertCommands,
    },

    /// Show backlink counts by status
    Status,
}

#[derive(Subcommand)]
enum UserCommands {
    /// Add a user
    Add {
        /// Email address (also the alert email recipient)
        email: String,
        /// Display name
        #[arg(long)]
        name: Option<String>,
        /// Fetch timeout in seconds (5-120)
        #[arg(long)]
        timeout: Option<u64>,
        /// How often scheduled checks run
        #[arg(long, value_enum)]
        frequency: Option<FrequencyArg>,
        /// Disable alert emails
        #[arg(long)]
        no_email: bool,
        /// Webhook URL for alert notifications
        #[arg(long)]
        webhook_url: Option<String>,
        /// Secret for signing webhook bodies
        #[arg(long)]
        webhook_secret: Option<String>,
        /// Comma-separated alert types to send to the webhook (default: all)
        #[arg(long, value_delimiter = ',')]
        events: Vec<String>,
    },

    /// List users
    List,

    /// Update a user's preferences
    Set {
        /// User ID
        id: i32,
        /// Fetch timeout in seconds (5-120)
        #[arg(long)]
        timeout: Option<u64>,
        #[arg(long, value_enum)]
        frequency: Option<FrequencyArg>,
        /// Enable or disable alert emails
        #[arg(long)]
        email_alerts: Option<bool>,
        #[arg(long)]
        webhook_url: Option<String>,
        #[arg(long)]
        webhook_secret: Option<String>,
        /// Comma-separated alert types; pass "all" to clear the filter
        #[arg(long, value_delimiter = ',')]
        events: Option<Vec<String>>,
        /// Remove the webhook
        #[arg(long, conflicts_with_all = ["webhook_url", "webhook_secret"])]
        clear_webhook: bool,
    },
}

#[derive(Subcommand)]
enum BacklinkCommands {
    /// Track a new backlink
    Add {
        /// Page expected to contain the link
        source_url: String,
        /// URL the link should point at
        target_url: String,
        /// Owning user (receives alerts)
        #[arg(long)]
        owner: Option<i32>,
        /// Expected anchor text
        #[arg(long)]
        anchor: Option<String>,
    },

    /// List tracked backlinks
    List {
        /// Only show backlinks with this status
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
    },

    /// Show a backlink with its recent checks and alerts
    Show {
        id: i32,
        /// Number of recent checks to show
        #[arg(short, long, default_value = "10")]
        limit: i64,
    },

    /// Stop tracking a backlink (deletes its history)
    Remove { id: i32 },
}

#[derive(Subcommand)]
enum AlertCommands {
    /// List recent alerts
    List {
        /// Only unread alerts
        #[arg(long)]
        unread: bool,
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Mark an alert as read
    Read { id: i32 },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        use_cwd: cli.cwd,
        data: cli.data,
    };
    let (settings, _config) = load_settings_with_options(options).await;

    match cli.command {
        Commands::Init => init::cmd_init(&settings).await,
        Commands::User { command } => match command {
            UserCommands::Add {
                email,
                name,
                timeout,
                frequency,
                no_email,
                webhook_url,
                webhook_secret,
                events,
            } => {
                user::cmd_user_add(
                    &settings,
                    user::NewUserArgs {
                        email,
                        name,
                        timeout,
                        frequency: frequency.map(Into::into),
                        email_alerts: !no_email,
                        webhook_url,
                        webhook_secret,
                        events,
                    },
                )
                .await
            }
            UserCommands::List => user::cmd_user_list(&settings).await,
            UserCommands::Set {
                id,
                timeout,
                frequency,
                email_alerts,
                webhook_url,
                webhook_secret,
                events,
                clear_webhook,
            } => {
                user::cmd_user_set(
                    &settings,
                    id,
                    user::UserChanges {
                        timeout,
                        frequency: frequency.map(Into::into),
                        email_alerts,
                        webhook_url,
                        webhook_secret,
                        events,
                        clear_webhook,
                    },
                )
                .await
            }
        },
        Commands::Backlink { command } => match command {
            BacklinkCommands::Add {
                source_url,
                target_url,
                owner,
                anchor,
            } => backlink::cmd_backlink_add(&settings, &source_url, &target_url, owner, anchor).await,
            BacklinkCommands::List { status } => {
                backlink::cmd_backlink_list(&settings, status.map(Into::into)).await
            }
            BacklinkCommands::Show { id, limit } => {
                backlink::cmd_backlink_show(&settings, id, limit).await
            }
            BacklinkCommands::Remove { id } => backlink::cmd_backlink_remove(&settings, id).await,
        },
        Commands::Check {
            ids,
            as_user,
            timeout,
        } => check::cmd_check(&settings, &ids, as_user, timeout).await,
        Commands::CheckAll { due, workers } => {
            check::cmd_check_all(&settings, due, workers.unwrap_or(settings.workers)).await
        }
        Commands::Alerts { command } => match command {
            AlertCommands::List { unread, limit } => {
                alerts::cmd_alerts_list(&settings, unread, limit).await
            }
            AlertCommands::Read { id } => alerts::cmd_alerts_read(&settings, id).await,
        },
        Commands::Status => backlink::cmd_status(&settings).await,
    }
}
