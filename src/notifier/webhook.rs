//! Discord webhook delivery.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use super::embed::WebhookPayload;
use crate::utils::AttemptTimeout;

/// One failed delivery attempt.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webhook rejected payload with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error(transparent)]
    Timeout(#[from] AttemptTimeout),
}

/// Where alerts go.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, payload: &WebhookPayload) -> Result<(), DeliveryError>;
}

/// Posts payloads to a Discord-compatible webhook URL.
#[derive(Clone)]
pub struct WebhookChannel {
    client: Client,
    url: String,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    async fn send(&self, payload: &WebhookPayload) -> Result<(), DeliveryError> {
        let response = self.client.post(&self.url).json(payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!("Webhook accepted payload (HTTP {})", status.as_u16());
        Ok(())
    }
}
