//! Linkwatch - verifies that third-party pages still link to your site.

use linkwatch::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    // Initialize logging based on verbosity
    let default_filter = if cli::is_verbose() {
        "linkwatch=info"
    } else {
        "linkwatch=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    cli::run().await
}
