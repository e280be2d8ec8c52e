//! Diesel models for the comments table.

use diesel::prelude::*;

use super::parse_datetime;
use crate::models::{Comment, StoredComment};
use crate::schema::comments;

/// Comment row from the database.
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = comments)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CommentRecord {
    pub id: i64,
    pub page_number: i32,
    pub author: String,
    pub content: String,
    pub posted_at: String,
    pub parent_id: Option<i64>,
    pub url: String,
    pub first_seen_at: String,
}

/// New comment for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = comments)]
pub struct NewComment<'a> {
    pub id: i64,
    pub page_number: i32,
    pub author: &'a str,
    pub content: &'a str,
    pub posted_at: &'a str,
    pub parent_id: Option<i64>,
    pub url: &'a str,
    pub first_seen_at: &'a str,
}

impl<'a> NewComment<'a> {
    pub fn new(comment: &'a Comment, first_seen_at: &'a str) -> Self {
        Self {
            id: comment.id,
            page_number: i32::try_from(comment.page_number).unwrap_or(i32::MAX),
            author: &comment.author,
            content: &comment.content,
            posted_at: &comment.timestamp,
            parent_id: comment.parent_id,
            url: &comment.url,
            first_seen_at,
        }
    }
}

impl From<CommentRecord> for StoredComment {
    fn from(record: CommentRecord) -> Self {
        StoredComment {
            comment: Comment {
                id: record.id,
                page_number: u32::try_from(record.page_number).unwrap_or(0),
                author: record.author,
                content: record.content,
                timestamp: record.posted_at,
                parent_id: record.parent_id,
                url: record.url,
            },
            first_seen_at: parse_datetime(&record.first_seen_at),
        }
    }
}
