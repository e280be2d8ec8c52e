//! Retention purge command.

use console::style;

use crate::cli::helpers::open_store;
use crate::config::Settings;

pub async fn cmd_purge(settings: &Settings, days: u32) -> anyhow::Result<()> {
    let store = open_store(settings).await?;
    let removed = store.purge_older_than(days).await?;
    let remaining = store.count().await?;

    println!(
        "{} Removed {} comments first seen more than {} days ago ({} remain)",
        style("✓").green(),
        removed,
        days,
        remaining
    );
    Ok(())
}
