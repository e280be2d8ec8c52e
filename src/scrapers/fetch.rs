//! Page-fetch collaborator interface.

use async_trait::async_trait;
use thiserror::Error;

use crate::utils::AttemptTimeout;

/// Failure to obtain the HTML of a page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed for {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("browser error for {url}: {message}")]
    Browser { url: String, message: String },
    #[error(transparent)]
    Timeout(#[from] AttemptTimeout),
}

/// Renders a URL into its final HTML.
///
/// Implementations own whatever heavy resource they need (an HTTP client, a
/// browser instance) and release it in [`PageFetcher::close`].
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;

    /// Release resources held by the fetcher.
    async fn close(&self) {}
}
