//! Ledger statistics command.

use console::style;

use crate::cli::helpers::open_store;
use crate::config::Settings;
use crate::utils::format_excerpt;

pub async fn cmd_stats(settings: &Settings, recent: i64) -> anyhow::Result<()> {
    let store = open_store(settings).await?;
    let total = store.count().await?;

    println!("{}", style("Ledger").bold());
    println!("  Location: {}", store.ledger().path().display());
    println!("  Comments: {}", style(total).cyan());

    if recent <= 0 || total == 0 {
        return Ok(());
    }

    println!();
    println!("{}", style(format!("Most recently seen ({})", recent)).bold());
    for stored in store.recent(recent).await? {
        let comment = &stored.comment;
        let marker = match comment.parent_id {
            Some(parent) => format!("↳ {}", parent),
            None => "●".to_string(),
        };
        println!(
            "  {} {} {} {} {}",
            style(stored.first_seen_at.format("%Y-%m-%d %H:%M:%S")).dim(),
            style(format!("#{}", comment.id)).cyan(),
            style(marker).dim(),
            style(&comment.author).green(),
            format_excerpt(&comment.content, 60)
        );
    }

    Ok(())
}
