//! Fan-out over independent futures with ordered results.

use std::future::Future;

use futures::stream::{self, StreamExt};

/// Runs a batch of independent futures concurrently on the current task and
/// returns their outputs in input order.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskGroup {
    limit: Option<usize>,
}

impl TaskGroup {
    /// Every future is polled at once.
    pub fn unbounded() -> Self {
        Self { limit: None }
    }

    /// At most `limit` futures are in flight at a time.
    pub fn bounded(limit: usize) -> Self {
        Self {
            limit: Some(limit.max(1)),
        }
    }

    /// Takes already-built futures; a lazy `map` over borrowed items kept in
    /// the returned future's state makes it lose `Send`.
    pub async fn run<Fut>(&self, tasks: Vec<Fut>) -> Vec<Fut::Output>
    where
        Fut: Future,
    {
        match self.limit {
            None => futures::future::join_all(tasks).await,
            Some(limit) => stream::iter(tasks).buffered(limit).collect().await,
        }
    }
}
