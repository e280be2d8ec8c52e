//! Shared helper functions for CLI commands.

use anyhow::Context;

use crate::config::Settings;
use crate::repository::{CommentStore, Ledger};

/// Open the ledger named by the settings.
pub async fn open_ledger(settings: &Settings) -> anyhow::Result<Ledger> {
    Ledger::open(&settings.database_path).await.with_context(|| {
        format!(
            "Failed to open ledger at {}",
            settings.database_path.display()
        )
    })
}

/// Open the ledger and wrap it in a store.
pub async fn open_store(settings: &Settings) -> anyhow::Result<CommentStore> {
    Ok(CommentStore::new(open_ledger(settings).await?))
}
