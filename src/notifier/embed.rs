//! Discord embed payloads for comment alerts.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Comment, CommentKind};

/// Discord blurple, used for new top-level comments.
pub const NEW_COMMENT_COLOR: u32 = 0x5865F2;
/// Green, used for replies.
pub const REPLY_COLOR: u32 = 0x57F287;

/// Default maximum description length in characters.
pub const DEFAULT_DESCRIPTION_LIMIT: usize = 300;

const ELLIPSIS: &str = "...";

/// Body of a webhook call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub fields: Vec<EmbedField>,
    pub url: String,
    /// Dispatch time, RFC 3339.
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl EmbedField {
    fn new(name: &str, value: impl Into<String>, inline: bool) -> Self {
        // Discord rejects empty field values
        let value = value.into();
        Self {
            name: name.to_string(),
            value: if value.trim().is_empty() {
                "-".to_string()
            } else {
                value
            },
            inline,
        }
    }
}

/// Shorten `text` to at most `max` characters, ending in `...` when cut.
///
/// Counts Unicode scalar values, not bytes, so multi-byte text is never
/// split inside a character.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }

    let marker_len = ELLIPSIS.len().min(max);
    let mut out: String = text.chars().take(max - marker_len).collect();
    out.push_str(&ELLIPSIS[..marker_len]);
    out
}

/// Build the alert embed for one comment.
pub fn build_embed(comment: &Comment, description_limit: usize, dispatched_at: DateTime<Utc>) -> Embed {
    let (title, color) = match comment.kind() {
        CommentKind::TopLevel => ("🆕 新規コメント", NEW_COMMENT_COLOR),
        CommentKind::Reply { .. } => ("💬 返信コメント", REPLY_COLOR),
    };

    let mut fields = vec![
        EmbedField::new("👤 投稿者", comment.author.as_str(), true),
        EmbedField::new("🕐 投稿時刻", comment.timestamp.as_str(), true),
    ];
    if let CommentKind::Reply { parent_id } = comment.kind() {
        fields.push(EmbedField::new(
            "↩️ 返信先",
            format!("コメントID: {}", parent_id),
            false,
        ));
    }

    Embed {
        title: title.to_string(),
        description: truncate(&comment.content, description_limit),
        color,
        fields,
        url: comment.url.clone(),
        timestamp: dispatched_at.to_rfc3339_opts(SecondsFormat::Millis, true),
    }
}

/// Single-embed payload for one comment.
pub fn build_payload(comment: &Comment, description_limit: usize, dispatched_at: DateTime<Utc>) -> WebhookPayload {
    WebhookPayload {
        embeds: vec![build_embed(comment, description_limit, dispatched_at)],
    }
}
