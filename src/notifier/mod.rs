//! Comment alerts.
//!
//! - `embed`: payload types and rendering (title, color, truncation)
//! - `webhook`: the [`NotificationChannel`] seam and the Discord webhook
//! - `dispatch`: concurrent per-comment delivery with isolated retries

pub mod dispatch;
pub mod embed;
pub mod webhook;

pub use dispatch::{DeliveryTally, NotificationDispatcher};
pub use embed::{build_embed, build_payload, truncate, Embed, EmbedField, WebhookPayload};
pub use webhook::{DeliveryError, NotificationChannel, WebhookChannel};
