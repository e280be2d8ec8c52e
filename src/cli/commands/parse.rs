//! Offline parser diagnostics.

use std::path::Path;

use anyhow::Context;
use console::style;

use crate::config::Settings;
use crate::scrapers::{locate_latest_page, parse_report};
use crate::utils::format_excerpt;

const PLACEHOLDER_BASE_URL: &str = "https://example.invalid/feed";
const SAMPLE_SIZE: usize = 5;

/// Parse a saved page and print what the monitor would extract from it.
pub async fn cmd_parse(
    settings: &Settings,
    file: &Path,
    page: u32,
    base_url: Option<&str>,
) -> anyhow::Result<()> {
    let html = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let base_url = base_url
        .or(settings.target_url.as_deref())
        .unwrap_or(PLACEHOLDER_BASE_URL);

    let latest = locate_latest_page(&html);
    let report = parse_report(&html, page, base_url);
    let replies: Vec<_> = report.comments.iter().filter(|c| c.is_reply()).collect();

    println!("{}", style(format!("Parsed {}", file.display())).bold());
    println!("  Latest page referenced: {}", latest);
    println!("  Total comments:  {}", style(report.comments.len()).cyan());
    println!(
        "  Top-level:       {}",
        report.comments.len() - replies.len()
    );
    println!("  Replies:         {}", replies.len());
    if !report.skipped.is_empty() {
        println!(
            "  {} Skipped containers: {}",
            style("!").yellow(),
            report.skipped.len()
        );
        for reason in report.skipped.iter().take(SAMPLE_SIZE) {
            println!("    - {}", reason);
        }
    }

    if !replies.is_empty() {
        println!();
        println!("{}", style("Sample replies").bold());
        for reply in replies.iter().take(SAMPLE_SIZE) {
            println!(
                "  #{} → #{} {}: {}",
                reply.id,
                reply.parent_id.unwrap_or_default(),
                style(&reply.author).green(),
                format_excerpt(&reply.content, 50)
            );
        }
    }

    Ok(())
}
