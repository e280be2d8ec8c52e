//! Monitor command.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use console::style;
use tracing::info;

use crate::cli::helpers::open_ledger;
use crate::config::{FetchEngine, FetchSettings, Settings};
use crate::monitor::{shutdown_signal, CycleOptions, CycleOutcome, CycleRunner, Scheduler};
use crate::notifier::{NotificationChannel, WebhookChannel};
use crate::repository::CommentStore;
use crate::scrapers::{BrowserFetcher, HttpFetcher, PageFetcher};
use crate::utils::format_duration;

/// Build the page fetcher for the configured engine.
fn build_fetcher(fetch: &FetchSettings) -> anyhow::Result<Arc<dyn PageFetcher>> {
    let fetcher: Arc<dyn PageFetcher> = match fetch.engine {
        FetchEngine::Http => Arc::new(
            HttpFetcher::with_user_agent(
                Duration::from_secs(fetch.timeout_secs),
                fetch.user_agent.as_deref(),
            )
            .context("Failed to build HTTP client")?,
        ),
        FetchEngine::Browser => Arc::new(BrowserFetcher::new(fetch.browser.clone())),
    };
    Ok(fetcher)
}

/// Run the monitor until interrupted, or for one cycle with `once`.
pub async fn cmd_watch(settings: &Settings, once: bool) -> anyhow::Result<()> {
    let target = settings
        .validate_for_watch()
        .context("Invalid configuration")?;

    info!("Starting threadwatch");
    info!(
        target_url = %target.target_url,
        interval_minutes = settings.interval_minutes,
        pages = settings.pages,
        engine = settings.fetch.engine.as_str(),
        db = %settings.database_path.display(),
        "Configuration loaded"
    );

    let ledger = open_ledger(settings).await?;
    let fetcher = build_fetcher(&settings.fetch)?;
    let channel: Arc<dyn NotificationChannel> = Arc::new(
        WebhookChannel::new(
            target.webhook_url.clone(),
            Duration::from_secs(settings.notify.timeout_secs),
        )
        .context("Failed to build webhook client")?,
    );

    let runner = Arc::new(CycleRunner::new(
        fetcher.clone(),
        CommentStore::new(ledger.clone()),
        settings.notify.dispatcher(),
        channel,
        CycleOptions {
            target_url: target.target_url.clone(),
            pages: settings.pages,
            fetch_policy: settings.fetch.retry_policy(),
            fetch_concurrency: settings.fetch.concurrency,
            retention_days: settings.retention_days,
        },
    ));

    let result = if once {
        run_once(&runner).await
    } else {
        info!(
            "Monitoring every {} minute(s); press Ctrl-C to stop",
            settings.interval_minutes
        );
        let scheduler = Scheduler::new(settings.interval(), {
            let runner = runner.clone();
            move || {
                let runner = runner.clone();
                async move {
                    runner.run_cycle().await;
                }
            }
        });
        let stats = scheduler.run_until(shutdown_signal()).await;
        info!(
            "Scheduler stopped after {} cycles ({} ticks skipped)",
            stats.started, stats.skipped
        );
        Ok(())
    };

    fetcher.close().await;
    drop(runner);
    ledger.close();
    info!("Cleanup completed");

    result
}

async fn run_once(runner: &CycleRunner) -> anyhow::Result<()> {
    let report = runner.run_cycle().await;

    let summary = match &report.outcome {
        CycleOutcome::Empty => "no comments scraped".to_string(),
        CycleOutcome::NothingNew => "no new comments".to_string(),
        CycleOutcome::Delivered(tally) => format!(
            "{} new, {} notified, {} failed",
            report.new, tally.succeeded, tally.failed
        ),
        CycleOutcome::Failed { stage, error } => {
            anyhow::bail!("Monitoring cycle failed while {}: {}", stage, error)
        }
    };

    println!(
        "{} Cycle finished in {}: {} (scraped {}, ledger total {})",
        style("✓").green(),
        format_duration(report.duration),
        summary,
        report.scraped,
        report
            .total
            .map(|t| t.to_string())
            .unwrap_or_else(|| "?".to_string())
    );
    Ok(())
}
