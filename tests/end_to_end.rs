//! End-to-end monitoring cycles against in-memory fetch and notification fakes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use threadwatch::monitor::{CycleOptions, CycleOutcome, CycleRunner};
use threadwatch::notifier::{
    DeliveryError, DeliveryTally, NotificationChannel, NotificationDispatcher, WebhookPayload,
};
use threadwatch::repository::{CommentStore, Ledger};
use threadwatch::scrapers::{FetchError, PageFetcher};
use threadwatch::utils::{Backoff, RetryPolicy};

const TARGET: &str = "https://feed.example/topic/";
const PAGE_ONE: &str = "https://feed.example/topic/comment-page-1/";

/// Serves whatever HTML is currently registered for a URL.
#[derive(Default)]
struct FakeFeed {
    pages: Mutex<HashMap<String, String>>,
    closed: Mutex<bool>,
}

impl FakeFeed {
    fn publish(&self, url: &str, html: String) {
        self.pages.lock().unwrap().insert(url.to_string(), html);
    }
}

#[async_trait]
impl PageFetcher for FakeFeed {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
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

    async fn close(&self) {
        *self.closed.lock().unwrap() = true;
    }
}

/// Records every payload; rejects those whose permalink ends with a
/// configured suffix.
#[derive(Default)]
struct RecordingChannel {
    delivered: Mutex<Vec<WebhookPayload>>,
    reject_suffix: Option<String>,
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    async fn send(&self, payload: &WebhookPayload) -> Result<(), DeliveryError> {
        if let Some(suffix) = &self.reject_suffix {
            if payload.embeds[0].url.ends_with(suffix.as_str()) {
                return Err(DeliveryError::Rejected {
                    status: 429,
                    body: "rate limited".to_string(),
                });
            }
        }
        self.delivered.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

impl RecordingChannel {
    fn delivered_urls(&self) -> Vec<String> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.embeds[0].url.clone())
            .collect()
    }
}

fn container(id: i64, parent: i64, inner: &str) -> String {
    format!(
        r#"<div id="wpd-comm-{id}_{parent}" class="wpd-comment">
             <div class="wpd-comment-wrap">
               <div id="comment-{id}">
                 <div class="wpd-comment-author">poster{id}</div>
                 <div class="wpd-comment-date">2024/06/01 12:{id:02}</div>
                 <div class="wpd-comment-text"><p>comment number {id}</p></div>
               </div>
             </div>
             {inner}
           </div>"#
    )
}

fn feed_page(body: &str) -> String {
    format!(
        r#"<html><body>
             <div class="wpd-pagination"><a href="{PAGE_ONE}">1</a></div>
             <div id="wpd-threads">{body}</div>
           </body></html>"#
    )
}

fn top_level(ids: &[i64]) -> String {
    ids.iter().map(|id| container(*id, 0, "")).collect()
}

async fn setup(channel: RecordingChannel) -> (Arc<FakeFeed>, Arc<RecordingChannel>, CycleRunner, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Ledger::open(&dir.path().join("data").join("comments.db"))
        .await
        .unwrap();

    let feed = Arc::new(FakeFeed::default());
    let channel = Arc::new(channel);
    let dispatcher = NotificationDispatcher::new(
        RetryPolicy::new(
            2,
            Duration::from_secs(5),
            Backoff::Linear(Duration::from_millis(5)),
        ),
        300,
    );

    let runner = CycleRunner::new(
        feed.clone(),
        CommentStore::new(ledger),
        dispatcher,
        channel.clone(),
        CycleOptions {
            target_url: TARGET.to_string(),
            pages: 1,
            fetch_policy: RetryPolicy::new(
                2,
                Duration::from_secs(5),
                Backoff::Exponential(Duration::from_millis(1)),
            ),
            fetch_concurrency: 1,
            retention_days: Some(30),
        },
    );

    (feed, channel, runner, dir)
}

fn publish(feed: &FakeFeed, body: &str) {
    let html = feed_page(body);
    feed.publish(TARGET, html.clone());
    feed.publish(PAGE_ONE, html);
}

#[tokio::test]
async fn test_second_cycle_notifies_only_new_comment() {
    let (feed, channel, runner, _dir) = setup(RecordingChannel::default()).await;

    publish(&feed, &top_level(&[1, 2, 3]));
    let first = runner.run_cycle().await;
    assert!(matches!(
        first.outcome,
        CycleOutcome::Delivered(DeliveryTally {
            succeeded: 3,
            failed: 0
        })
    ));
    assert_eq!(first.new, 3);
    assert_eq!(first.total, Some(3));
    assert_eq!(channel.delivered_urls().len(), 3);

    publish(&feed, &top_level(&[1, 2, 3, 4]));
    let second = runner.run_cycle().await;
    assert_eq!(second.scraped, 4);
    assert_eq!(second.new, 1);
    assert_eq!(second.total, Some(4));

    let urls = channel.delivered_urls();
    assert_eq!(urls.len(), 4);
    assert_eq!(urls[3], "https://feed.example/topic/comment-page-1/#comment-4");

    let third = runner.run_cycle().await;
    assert!(matches!(third.outcome, CycleOutcome::NothingNew));
    assert_eq!(channel.delivered_urls().len(), 4);
}

#[tokio::test]
async fn test_nested_replies_are_stored_flat_and_alerted_as_replies() {
    let (feed, channel, runner, _dir) = setup(RecordingChannel::default()).await;

    let thread = container(10, 0, &container(11, 10, &container(12, 11, "")));
    publish(&feed, &thread);
    runner.run_cycle().await;

    let store = runner.store();
    assert_eq!(store.get(10).await.unwrap().unwrap().comment.parent_id, None);
    assert_eq!(store.get(11).await.unwrap().unwrap().comment.parent_id, Some(10));
    assert_eq!(store.get(12).await.unwrap().unwrap().comment.parent_id, Some(11));

    let delivered = channel.delivered.lock().unwrap();
    let reply_titles = delivered
        .iter()
        .filter(|p| p.embeds[0].title == "💬 返信コメント")
        .count();
    assert_eq!(reply_titles, 2);
}

#[tokio::test]
async fn test_failed_delivery_does_not_block_siblings_or_refire() {
    let channel = RecordingChannel {
        reject_suffix: Some("#comment-2".to_string()),
        ..Default::default()
    };
    let (feed, channel, runner, _dir) = setup(channel).await;

    publish(&feed, &top_level(&[1, 2, 3]));
    let report = runner.run_cycle().await;
    assert!(matches!(
        report.outcome,
        CycleOutcome::Delivered(DeliveryTally {
            succeeded: 2,
            failed: 1
        })
    ));

    // Persisted before notifying, so the failed alert is not retried next cycle.
    assert!(runner.store().exists(2).await.unwrap());
    let again = runner.run_cycle().await;
    assert!(matches!(again.outcome, CycleOutcome::NothingNew));
    assert_eq!(
        channel.delivered_urls(),
        vec![
            "https://feed.example/topic/comment-page-1/#comment-1".to_string(),
            "https://feed.example/topic/comment-page-1/#comment-3".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_unreachable_feed_fails_cycle_and_next_cycle_recovers() {
    let (feed, channel, runner, _dir) = setup(RecordingChannel::default()).await;

    let failed = runner.run_cycle().await;
    assert!(failed.outcome.is_failed());
    assert!(channel.delivered_urls().is_empty());

    publish(&feed, &top_level(&[7]));
    let recovered = runner.run_cycle().await;
    assert_eq!(recovered.new, 1);
    assert_eq!(channel.delivered_urls().len(), 1);

    feed.close().await;
    assert!(*feed.closed.lock().unwrap());
}
