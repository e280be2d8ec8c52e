//! Initialize command.

use console::style;

use crate::cli::helpers::open_ledger;
use crate::config::Settings;

/// Create the ledger database and schema.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    let ledger = open_ledger(settings).await?;

    println!(
        "{} Initialized ledger at {}",
        style("✓").green(),
        ledger.path().display()
    );
    if settings.target_url.is_none() || settings.webhook_url.is_none() {
        println!(
            "{} Set TARGET_URL and DISCORD_WEBHOOK_URL (or add them to threadwatch.toml) before running watch",
            style("!").yellow()
        );
    }

    ledger.close();
    Ok(())
}
