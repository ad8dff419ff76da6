//! Initialize command.

use console::style;

use crate::config::Settings;

/// Initialize the data directory and database.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    settings.ensure_directories()?;

    let ctx = settings.create_db_context();
    ctx.init_schema().await?;

    println!(
        "{} Initialized Linkwatch in {}",
        style("✓").green(),
        settings.data_dir.display()
    );
    if ctx.users().list().await?.is_empty() {
        println!("  Add a user with 'linkwatch user add <email>' to receive alerts");
    }

    Ok(())
}
