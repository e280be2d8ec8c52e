//! One monitoring pass over the feed.
//!
//! ```text
//! Idle → Fetching → Parsing → Filtering → Persisting → Notifying → Summarizing → Idle
//!           │          │          │
//!           └──────────┴──────────┴──→ Failed (logged, next tick starts fresh)
//! ```
//!
//! A cycle never returns an error to its caller; every failure is folded
//! into the [`CycleReport`].

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::notifier::{DeliveryTally, NotificationChannel, NotificationDispatcher};
use crate::repository::{CommentStore, StoreError};
use crate::scrapers::{
    build_page_urls, locate_latest_page, parse_multiple, FetchError, PageFetcher, PageHtml,
};
use crate::utils::{format_duration, Exhausted, RetryPolicy, TaskGroup};

/// Where a cycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStage {
    Idle,
    Fetching,
    Parsing,
    Filtering,
    Persisting,
    Notifying,
    Summarizing,
}

impl CycleStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStage::Idle => "idle",
            CycleStage::Fetching => "fetching",
            CycleStage::Parsing => "parsing",
            CycleStage::Filtering => "filtering",
            CycleStage::Persisting => "persisting",
            CycleStage::Notifying => "notifying",
            CycleStage::Summarizing => "summarizing",
        }
    }
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecoverable failure inside a cycle.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: Exhausted<FetchError>,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How a cycle ended.
#[derive(Debug)]
pub enum CycleOutcome {
    /// Nothing could be scraped.
    Empty,
    /// Comments were scraped but all were already known.
    NothingNew,
    /// New comments were stored and alerts sent.
    Delivered(DeliveryTally),
    Failed { stage: CycleStage, error: CycleError },
}

impl CycleOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, CycleOutcome::Failed { .. })
    }
}

/// Summary of one cycle.
#[derive(Debug)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    /// Comments parsed across all fetched pages.
    pub scraped: usize,
    /// Comments that were new and are now stored.
    pub new: usize,
    pub purged: usize,
    /// Ledger size after the cycle, if it could be read.
    pub total: Option<i64>,
    pub duration: Duration,
}

/// Per-cycle knobs.
#[derive(Debug, Clone)]
pub struct CycleOptions {
    /// Listing page of the feed; also the base for page URLs and permalinks.
    pub target_url: String,
    /// How many of the newest pages to scan.
    pub pages: u32,
    pub fetch_policy: RetryPolicy,
    /// Page fetches allowed in flight at once.
    pub fetch_concurrency: usize,
    pub retention_days: Option<u32>,
}

/// Runs monitoring cycles against injected collaborators.
pub struct CycleRunner {
    fetcher: Arc<dyn PageFetcher>,
    store: CommentStore,
    dispatcher: NotificationDispatcher,
    channel: Arc<dyn NotificationChannel>,
    options: CycleOptions,
}

/// Counters filled in while a cycle progresses.
struct Progress {
    stage: CycleStage,
    scraped: usize,
    new: usize,
}

impl Progress {
    fn enter(&mut self, stage: CycleStage) {
        debug!("Cycle stage: {} -> {}", self.stage, stage);
        self.stage = stage;
    }
}

impl CycleRunner {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        store: CommentStore,
        dispatcher: NotificationDispatcher,
        channel: Arc<dyn NotificationChannel>,
        options: CycleOptions,
    ) -> Self {
        Self {
            fetcher,
            store,
            dispatcher,
            channel,
            options,
        }
    }

    pub fn store(&self) -> &CommentStore {
        &self.store
    }

    /// Run one full cycle.
    pub async fn run_cycle(&self) -> CycleReport {
        let start = Instant::now();
        info!("{}", "=".repeat(60));
        info!("Starting monitoring cycle for {}", self.options.target_url);

        let mut progress = Progress {
            stage: CycleStage::Idle,
            scraped: 0,
            new: 0,
        };

        let outcome = match self.execute(&mut progress).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    stage = %progress.stage,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Monitoring cycle failed: {}",
                    e
                );
                CycleOutcome::Failed {
                    stage: progress.stage,
                    error: e,
                }
            }
        };

        progress.enter(CycleStage::Summarizing);
        let purged = self.purge_expired().await;
        let total = match self.store.count().await {
            Ok(total) => Some(total),
            Err(e) => {
                warn!("Could not read ledger size: {}", e);
                None
            }
        };

        let duration = start.elapsed();
        info!(
            duration_ms = duration.as_millis() as u64,
            scraped = progress.scraped,
            new = progress.new,
            total = total.unwrap_or(-1),
            "Monitoring cycle completed in {}",
            format_duration(duration)
        );
        info!("{}", "=".repeat(60));
        progress.enter(CycleStage::Idle);

        CycleReport {
            outcome,
            scraped: progress.scraped,
            new: progress.new,
            purged,
            total,
            duration,
        }
    }

    async fn execute(&self, progress: &mut Progress) -> Result<CycleOutcome, CycleError> {
        progress.enter(CycleStage::Fetching);
        let pages = self.fetch_pages().await?;

        progress.enter(CycleStage::Parsing);
        let scraped = parse_multiple(&pages, &self.options.target_url);
        progress.scraped = scraped.len();
        if scraped.is_empty() {
            warn!("No comments scraped, skipping cycle");
            return Ok(CycleOutcome::Empty);
        }

        // Filter and insert run in one ledger transaction.
        progress.enter(CycleStage::Filtering);
        let fresh = self.store.record_new(&scraped).await?;
        progress.new = fresh.len();
        if fresh.is_empty() {
            info!("No new comments found");
            return Ok(CycleOutcome::NothingNew);
        }

        progress.enter(CycleStage::Persisting);
        info!("Found {} new comments", fresh.len());

        progress.enter(CycleStage::Notifying);
        let tally = self
            .dispatcher
            .notify_all(self.channel.as_ref(), &fresh)
            .await;

        Ok(CycleOutcome::Delivered(tally))
    }

    /// Fetch the listing, find the newest page and fetch the pages to scan.
    async fn fetch_pages(&self) -> Result<Vec<PageHtml>, CycleError> {
        let target = &self.options.target_url;
        let listing = self.fetch_with_retry(target).await?;

        let latest = locate_latest_page(&listing);
        let refs = build_page_urls(target, latest, self.options.pages);
        info!(
            "Latest page is {}; scanning {} page(s)",
            latest,
            refs.len()
        );

        let fetches: Vec<_> = refs
            .iter()
            .map(|page| async move {
                self.fetch_with_retry(&page.url)
                    .await
                    .map(|html| PageHtml {
                        html,
                        page_number: page.number,
                    })
            })
            .collect();

        TaskGroup::bounded(self.options.fetch_concurrency)
            .run(fetches)
            .await
            .into_iter()
            .collect()
    }

    async fn fetch_with_retry(&self, url: &str) -> Result<String, CycleError> {
        let label = format!("fetch {}", url);
        self.options
            .fetch_policy
            .run(&label, |_| self.fetcher.fetch(url))
            .await
            .map_err(|source| CycleError::Fetch {
                url: url.to_string(),
                source,
            })
    }

    async fn purge_expired(&self) -> usize {
        let Some(days) = self.options.retention_days else {
            return 0;
        };
        match self.store.purge_older_than(days).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!("Retention purge failed: {}", e);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::{DeliveryError, WebhookPayload};
    use crate::repository::Ledger;
    use crate::utils::Backoff;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::tempdir;

    const TARGET: &str = "https://example.com/feed/";

    #[derive(Default)]
    struct MapFetcher {
        pages: Mutex<HashMap<String, String>>,
        requested: Mutex<Vec<String>>,
    }

    impl MapFetcher {
        fn serve(&self, url: &str, html: String) {
            self.pages.lock().unwrap().insert(url.to_string(), html);
        }
    }

    #[async_trait]
    impl PageFetcher for MapFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.requested.lock().unwrap().push(url.to_string());
            self.pages
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .ok_or_else(|| FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                })
        }
    }

    #[derive(Default)]
    struct CountingChannel {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NotificationChannel for CountingChannel {
        async fn send(&self, payload: &WebhookPayload) -> Result<(), DeliveryError> {
            self.sent.lock().unwrap().push(payload.embeds[0].url.clone());
            Ok(())
        }
    }

    fn comment_html(id: i64, parent: i64) -> String {
        format!(
            r#"<div id="wpd-comm-{id}_{parent}"><div id="comment-{id}">
                 <div class="wpd-comment-author">user{id}</div>
                 <div class="wpd-comment-text">text {id}</div>
               </div></div>"#
        )
    }

    fn page(ids: &[i64], latest: u32) -> String {
        let links: String = (1..=latest)
            .map(|n| format!(r#"<a href="{TARGET}comment-page-{n}/">{n}</a>"#))
            .collect();
        let body: String = ids.iter().map(|id| comment_html(*id, 0)).collect();
        format!("<html><body><nav>{links}</nav>{body}</body></html>")
    }

    async fn runner(
        fetcher: Arc<MapFetcher>,
        channel: Arc<CountingChannel>,
        pages: u32,
        dir: &tempfile::TempDir,
    ) -> CycleRunner {
        let ledger = Ledger::open(&dir.path().join("c.db")).await.unwrap();
        CycleRunner::new(
            fetcher,
            CommentStore::new(ledger),
            NotificationDispatcher::default(),
            channel,
            CycleOptions {
                target_url: TARGET.to_string(),
                pages,
                fetch_policy: RetryPolicy::new(
                    2,
                    Duration::from_secs(5),
                    Backoff::Exponential(Duration::from_millis(1)),
                ),
                fetch_concurrency: 2,
                retention_days: None,
            },
        )
    }

    #[tokio::test]
    async fn test_scans_newest_pages_with_their_numbers() {
        let dir = tempdir().unwrap();
        let fetcher = Arc::new(MapFetcher::default());
        let channel = Arc::new(CountingChannel::default());

        fetcher.serve(TARGET, page(&[], 3));
        fetcher.serve(
            "https://example.com/feed/comment-page-3/",
            page(&[30, 31], 3),
        );
        fetcher.serve("https://example.com/feed/comment-page-2/", page(&[20], 3));

        let runner = runner(fetcher.clone(), channel.clone(), 2, &dir).await;
        let report = runner.run_cycle().await;

        assert!(matches!(
            report.outcome,
            CycleOutcome::Delivered(DeliveryTally {
                succeeded: 3,
                failed: 0
            })
        ));
        assert_eq!(report.scraped, 3);
        assert_eq!(report.new, 3);
        assert_eq!(report.total, Some(3));

        let stored = runner.store().get(20).await.unwrap().unwrap();
        assert_eq!(stored.comment.page_number, 2);
        assert_eq!(
            stored.comment.url,
            "https://example.com/feed/comment-page-2/#comment-20"
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_fails_cycle_without_side_effects() {
        let dir = tempdir().unwrap();
        let fetcher = Arc::new(MapFetcher::default());
        let channel = Arc::new(CountingChannel::default());

        // Listing references page 2, which is never served.
        fetcher.serve(TARGET, page(&[1], 2));

        let runner = runner(fetcher.clone(), channel.clone(), 1, &dir).await;
        let report = runner.run_cycle().await;

        match report.outcome {
            CycleOutcome::Failed {
                stage,
                error: CycleError::Fetch { url, source },
            } => {
                assert_eq!(stage, CycleStage::Fetching);
                assert_eq!(url, "https://example.com/feed/comment-page-2/");
                assert_eq!(source.attempts, 2);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(report.total, Some(0));
        assert!(channel.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_scrape_short_circuits() {
        let dir = tempdir().unwrap();
        let fetcher = Arc::new(MapFetcher::default());
        let channel = Arc::new(CountingChannel::default());

        fetcher.serve(TARGET, page(&[], 1));
        fetcher.serve("https://example.com/feed/comment-page-1/", page(&[], 1));

        let report = runner(fetcher, channel.clone(), 1, &dir).await.run_cycle().await;
        assert!(matches!(report.outcome, CycleOutcome::Empty));
        assert_eq!(report.scraped, 0);
        assert!(channel.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_known_comments_are_not_renotified() {
        let dir = tempdir().unwrap();
        let fetcher = Arc::new(MapFetcher::default());
        let channel = Arc::new(CountingChannel::default());

        fetcher.serve(TARGET, page(&[], 1));
        fetcher.serve("https://example.com/feed/comment-page-1/", page(&[5, 6], 1));

        let runner = runner(fetcher, channel.clone(), 1, &dir).await;
        runner.run_cycle().await;
        let second = runner.run_cycle().await;

        assert!(matches!(second.outcome, CycleOutcome::NothingNew));
        assert_eq!(second.scraped, 2);
        assert_eq!(second.new, 0);
        assert_eq!(channel.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cycle_runs_on_a_spawned_task() {
        let dir = tempdir().unwrap();
        let fetcher = Arc::new(MapFetcher::default());
        let channel = Arc::new(CountingChannel::default());

        fetcher.serve(TARGET, page(&[], 2));
        fetcher.serve("https://example.com/feed/comment-page-2/", page(&[8], 2));
        fetcher.serve("https://example.com/feed/comment-page-1/", page(&[7], 2));

        let runner = Arc::new(runner(fetcher, channel.clone(), 2, &dir).await);
        let report = tokio::spawn({
            let runner = runner.clone();
            async move { runner.run_cycle().await }
        })
        .await
        .unwrap();

        assert_eq!(report.new, 2);
        assert_eq!(channel.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_store_failure_fails_cycle_and_next_cycle_recovers() {
        use crate::repository::SCHEMA;
        use diesel_async::SimpleAsyncConnection;

        let dir = tempdir().unwrap();
        let fetcher = Arc::new(MapFetcher::default());
        let channel = Arc::new(CountingChannel::default());

        fetcher.serve(TARGET, page(&[], 1));
        fetcher.serve("https://example.com/feed/comment-page-1/", page(&[3, 4], 1));

        let runner = runner(fetcher, channel.clone(), 1, &dir).await;
        let ledger = runner.store().ledger().clone();
        ledger
            .lock()
            .await
            .batch_execute("DROP TABLE comments")
            .await
            .unwrap();

        let failed = runner.run_cycle().await;
        match failed.outcome {
            CycleOutcome::Failed {
                stage,
                error: CycleError::Store(_),
            } => assert_eq!(stage, CycleStage::Filtering),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(failed.scraped, 2);
        assert_eq!(failed.new, 0);
        assert_eq!(failed.total, None);
        assert!(channel.sent.lock().unwrap().is_empty());

        ledger.lock().await.batch_execute(SCHEMA).await.unwrap();

        let recovered = runner.run_cycle().await;
        assert!(matches!(
            recovered.outcome,
            CycleOutcome::Delivered(DeliveryTally {
                succeeded: 2,
                failed: 0
            })
        ));
        assert_eq!(recovered.total, Some(2));
        assert_eq!(channel.sent.lock().unwrap().len(), 2);
    }
}
