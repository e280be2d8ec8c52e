//! Data models for threadwatch.

mod comment;

pub use comment::{Comment, CommentId, CommentKind, StoredComment, ANONYMOUS_AUTHOR};
