//! Comment models for the monitored feed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Comment identifier assigned by the feed itself.
pub type CommentId = i64;

/// Author shown when the markup carries no author name.
pub const ANONYMOUS_AUTHOR: &str = "匿名";

/// Whether a comment starts a thread or answers another comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentKind {
    TopLevel,
    Reply { parent_id: CommentId },
}

/// A comment observed on one page of the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// Feed-assigned identifier, unique across the whole feed.
    pub id: CommentId,
    /// Page the comment was observed on.
    pub page_number: u32,
    pub author: String,
    /// Extracted body text, never empty.
    pub content: String,
    /// Posted time exactly as rendered by the feed.
    pub timestamp: String,
    /// Immediate thread parent. The parent may live on another page or not
    /// be stored yet.
    pub parent_id: Option<CommentId>,
    /// Permalink to the comment.
    pub url: String,
}

impl Comment {
    pub fn kind(&self) -> CommentKind {
        match self.parent_id {
            Some(parent_id) => CommentKind::Reply { parent_id },
            None => CommentKind::TopLevel,
        }
    }

    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }
}

/// A comment as persisted in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredComment {
    #[serde(flatten)]
    pub comment: Comment,
    /// When the ledger first ingested this comment.
    pub first_seen_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(parent_id: Option<CommentId>) -> Comment {
        Comment {
            id: 10,
            page_number: 3,
            author: "tester".to_string(),
            content: "hello".to_string(),
            timestamp: "2024/01/01 12:00".to_string(),
            parent_id,
            url: "https://example.com/feed/comment-page-3/#comment-10".to_string(),
        }
    }

    #[test]
    fn test_kind_follows_parent() {
        assert_eq!(comment(None).kind(), CommentKind::TopLevel);
        assert_eq!(
            comment(Some(7)).kind(),
            CommentKind::Reply { parent_id: 7 }
        );
        assert!(comment(Some(7)).is_reply());
        assert!(!comment(None).is_reply());
    }
}
