//! Comment extraction from rendered feed pages.
//!
//! Each comment lives in a container `div#wpd-comm-{id}_{parent}` where
//! `parent` is 0 for top-level comments and the parent's id for replies.
//! Replies are nested inside their parent's container in the markup, but the
//! encoded parent is the only thing that decides threading, so the output is
//! always a flat list in document order.
//!
//! ```text
//! div#wpd-comm-{id}_{parent}
//! └── div.wpd-comment-wrap
//!     └── div#comment-{id}
//!         ├── .wpd-comment-author
//!         ├── .wpd-comment-date
//!         └── .wpd-comment-text
//! ```

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::locator::normalize_base_url;
use crate::models::{Comment, CommentId, ANONYMOUS_AUTHOR};

static CONTAINER: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"div[id^="wpd-comm-"]"#).unwrap());

static CONTAINER_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^wpd-comm-(\d+)_(\d+)$").unwrap());

static AUTHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".wpd-comment-author").unwrap());

static CONTENT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".wpd-comment-text").unwrap());

static DATE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".wpd-comment-date").unwrap());

/// Why a single comment container was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("container id {0:?} does not encode a comment id and parent")]
    MalformedContainerId(String),
    #[error("comment body element not found for comment {0}")]
    MissingBody(CommentId),
    #[error("comment {0} has no text content")]
    EmptyContent(CommentId),
}

/// Comments extracted from one page plus the containers that were skipped.
#[derive(Debug, Clone, Default)]
pub struct ParseReport {
    pub comments: Vec<Comment>,
    pub skipped: Vec<ParseError>,
}

/// One fetched page handed to [`parse_multiple`].
#[derive(Debug, Clone)]
pub struct PageHtml {
    pub html: String,
    pub page_number: u32,
}

/// Parse a container id into `(comment_id, parent_id)`.
///
/// A parent reference of 0 means the comment is top-level.
pub fn parse_container_id(container_id: &str) -> Option<(CommentId, Option<CommentId>)> {
    let caps = CONTAINER_ID.captures(container_id)?;
    let comment_id = caps[1].parse::<CommentId>().ok()?;
    let parent_ref = caps[2].parse::<CommentId>().ok()?;
    let parent_id = (parent_ref != 0).then_some(parent_ref);
    Some((comment_id, parent_id))
}

/// Permalink for a comment on a given page.
pub fn comment_url(base_url: &str, page_number: u32, comment_id: CommentId) -> String {
    format!(
        "{}/comment-page-{}/#comment-{}",
        normalize_base_url(base_url),
        page_number,
        comment_id
    )
}

/// Parse every comment on a page, in document order.
pub fn parse(html: &str, page_number: u32, base_url: &str) -> Vec<Comment> {
    parse_report(html, page_number, base_url).comments
}

/// Parse a page and keep the list of skipped containers.
///
/// Repeated container ids are all emitted; uniqueness is enforced by the
/// ledger, not here.
pub fn parse_report(html: &str, page_number: u32, base_url: &str) -> ParseReport {
    let document = Html::parse_document(html);
    let mut report = ParseReport::default();

    for container in document.select(&CONTAINER) {
        match parse_container(container, page_number, base_url) {
            Ok(comment) => {
                debug!(
                    comment_id = comment.id,
                    author = %comment.author,
                    is_reply = comment.is_reply(),
                    "Parsed comment"
                );
                report.comments.push(comment);
            }
            Err(e) => {
                debug!(page = page_number, "Skipping comment container: {}", e);
                report.skipped.push(e);
            }
        }
    }

    if !report.skipped.is_empty() {
        warn!(
            "Skipped {} malformed comment containers on page {}",
            report.skipped.len(),
            page_number
        );
    }
    info!(
        "Parsed {} comments from page {}",
        report.comments.len(),
        page_number
    );

    report
}

/// Parse several pages, concatenating results in the order given.
///
/// Pages are parsed independently; markup problems on one page never hide
/// comments on another.
pub fn parse_multiple(pages: &[PageHtml], base_url: &str) -> Vec<Comment> {
    let comments: Vec<Comment> = pages
        .iter()
        .flat_map(|page| parse(&page.html, page.page_number, base_url))
        .collect();

    info!("Total parsed comments: {}", comments.len());
    comments
}

fn parse_container(
    container: ElementRef<'_>,
    page_number: u32,
    base_url: &str,
) -> Result<Comment, ParseError> {
    let container_id = container.value().id().unwrap_or_default();
    let (id, parent_id) = parse_container_id(container_id)
        .ok_or_else(|| ParseError::MalformedContainerId(container_id.to_string()))?;

    // Ids are numeric, so the selector is always valid.
    let body_selector = Selector::parse(&format!("div#comment-{}", id))
        .map_err(|_| ParseError::MissingBody(id))?;
    let body = container
        .select(&body_selector)
        .next()
        .ok_or(ParseError::MissingBody(id))?;

    let content = first_text(body, &CONTENT).unwrap_or_default();
    if content.is_empty() {
        return Err(ParseError::EmptyContent(id));
    }

    let author = first_text(body, &AUTHOR)
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| ANONYMOUS_AUTHOR.to_string());
    let timestamp = first_text(body, &DATE).unwrap_or_default();

    Ok(Comment {
        id,
        page_number,
        author,
        content,
        timestamp,
        parent_id,
        url: comment_url(base_url, page_number, id),
    })
}

/// Trimmed text of the first element matching `selector`.
fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope
        .select(selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
}
