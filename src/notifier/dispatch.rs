//! Per-comment alert fan-out with isolated retries.

use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use super::embed::{build_payload, DEFAULT_DESCRIPTION_LIMIT};
use super::webhook::{DeliveryError, NotificationChannel};
use crate::models::Comment;
use crate::utils::{Backoff, RetryPolicy, TaskGroup};

/// Outcome counts for one batch of deliveries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryTally {
    pub succeeded: usize,
    pub failed: usize,
}

impl DeliveryTally {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Renders and delivers one alert per comment.
#[derive(Debug, Clone, Copy)]
pub struct NotificationDispatcher {
    policy: RetryPolicy,
    description_limit: usize,
}

impl Default for NotificationDispatcher {
    /// 2 attempts, 10s per attempt, 2s × attempt between attempts.
    fn default() -> Self {
        Self::new(
            RetryPolicy::new(2, Duration::from_secs(10), Backoff::Linear(Duration::from_secs(2))),
            DEFAULT_DESCRIPTION_LIMIT,
        )
    }
}

impl NotificationDispatcher {
    pub fn new(policy: RetryPolicy, description_limit: usize) -> Self {
        Self {
            policy,
            description_limit,
        }
    }

    /// Deliver one alert per comment, all concurrently.
    ///
    /// Each delivery retries on its own; a comment that exhausts its budget
    /// is counted as failed and never affects its siblings.
    pub async fn notify_all(
        &self,
        channel: &dyn NotificationChannel,
        comments: &[Comment],
    ) -> DeliveryTally {
        if comments.is_empty() {
            return DeliveryTally::default();
        }

        info!("Sending {} notifications", comments.len());
        let deliveries: Vec<_> = comments
            .iter()
            .map(|comment| self.notify_one(channel, comment))
            .collect();
        let outcomes = TaskGroup::unbounded().run(deliveries).await;

        let mut tally = DeliveryTally::default();
        for outcome in outcomes {
            match outcome {
                Ok(()) => tally.succeeded += 1,
                Err(_) => tally.failed += 1,
            }
        }

        info!(
            "Notification results: {} succeeded, {} failed",
            tally.succeeded, tally.failed
        );
        if tally.failed > 0 {
            warn!(
                "{} of {} notifications failed",
                tally.failed,
                tally.total()
            );
        }
        tally
    }

    /// Deliver a single alert with retries.
    pub async fn notify_one(
        &self,
        channel: &dyn NotificationChannel,
        comment: &Comment,
    ) -> Result<(), DeliveryError> {
        let payload = build_payload(comment, self.description_limit, Utc::now());
        let label = format!("notification for comment {}", comment.id);

        match self.policy.run(&label, |_| channel.send(&payload)).await {
            Ok(()) => {
                info!(comment_id = comment.id, "Sent notification");
                Ok(())
            }
            Err(exhausted) => {
                error!(
                    comment_id = comment.id,
                    attempts = exhausted.attempts,
                    "Failed to send notification: {}",
                    exhausted.last
                );
                Err(exhausted.last)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::WebhookPayload;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Rejects every payload whose permalink ends with one of `failing`.
    #[derive(Default)]
    struct ScriptedChannel {
        failing: Vec<String>,
        attempts: Mutex<HashMap<String, u32>>,
    }

    impl ScriptedChannel {
        fn failing(suffixes: &[&str]) -> Self {
            Self {
                failing: suffixes.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }
        }

        fn attempts_for(&self, url: &str) -> u32 {
            self.attempts.lock().unwrap().get(url).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl NotificationChannel for ScriptedChannel {
        async fn send(&self, payload: &WebhookPayload) -> Result<(), DeliveryError> {
            let url = payload.embeds[0].url.clone();
            *self.attempts.lock().unwrap().entry(url.clone()).or_default() += 1;

            if self.failing.iter().any(|s| url.ends_with(s.as_str())) {
                return Err(DeliveryError::Rejected {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            Ok(())
        }
    }

    fn comment(id: i64) -> Comment {
        Comment {
            id,
            page_number: 1,
            author: "a".to_string(),
            content: format!("body {}", id),
            timestamp: "t".to_string(),
            parent_id: None,
            url: format!("https://example.com/feed/comment-page-1/#comment-{}", id),
        }
    }

    fn dispatcher(attempts: u32) -> NotificationDispatcher {
        NotificationDispatcher::new(
            RetryPolicy::new(
                attempts,
                Duration::from_secs(10),
                Backoff::Linear(Duration::from_secs(2)),
            ),
            DEFAULT_DESCRIPTION_LIMIT,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_isolated_to_one_item() {
        let channel = ScriptedChannel::failing(&["#comment-2"]);
        let batch = vec![comment(1), comment(2), comment(3)];

        let tally = dispatcher(2).notify_all(&channel, &batch).await;

        assert_eq!(
            tally,
            DeliveryTally {
                succeeded: 2,
                failed: 1
            }
        );
        assert_eq!(channel.attempts_for(&batch[0].url), 1);
        assert_eq!(channel.attempts_for(&batch[1].url), 2);
        assert_eq!(channel.attempts_for(&batch[2].url), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deliveries_run_concurrently() {
        let channel = ScriptedChannel::failing(&["#comment-1", "#comment-2"]);
        let start = Instant::now();

        let tally = dispatcher(3)
            .notify_all(&channel, &[comment(1), comment(2)])
            .await;

        assert_eq!(tally.failed, 2);
        // Both items wait 2s then 4s side by side, not one after the other.
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test]
    async fn test_empty_batch_sends_nothing() {
        let channel = ScriptedChannel::default();
        let tally = dispatcher(2).notify_all(&channel, &[]).await;
        assert_eq!(tally, DeliveryTally::default());
        assert!(channel.attempts.lock().unwrap().is_empty());
    }
}
