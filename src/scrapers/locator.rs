//! Latest-page detection for paginated comment feeds.
//!
//! The feed paginates as `<base>/comment-page-N/`. Pagination links and the
//! "copy link" buttons (`data-wpd-clipboard`) both carry that path, so the
//! highest number referenced anywhere on a listing page is the newest page.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, warn};

static PAGE_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"comment-page-(\d+)").unwrap());

static PAGE_REF_CARRIERS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"a[href*="comment-page-"], [data-wpd-clipboard*="comment-page-"]"#).unwrap()
});

const CLIPBOARD_ATTR: &str = "data-wpd-clipboard";

/// A page of the feed together with the URL it is served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRef {
    pub number: u32,
    pub url: String,
}

/// Find the highest page number referenced in a listing page.
///
/// Returns 1 when the page references no other pages, which is the shape of
/// a feed that has not been paginated yet.
pub fn locate_latest_page(listing_html: &str) -> u32 {
    let document = Html::parse_document(listing_html);

    let latest = document
        .select(&PAGE_REF_CARRIERS)
        .flat_map(|element| {
            let attrs = element.value();
            [attrs.attr("href"), attrs.attr(CLIPBOARD_ATTR)]
        })
        .flatten()
        .flat_map(|text| PAGE_REF.captures_iter(text))
        .filter_map(|caps| caps[1].parse::<u32>().ok())
        .filter(|&page| page >= 1)
        .max();

    match latest {
        Some(page) => {
            debug!("Detected latest page number: {}", page);
            page
        }
        None => {
            warn!("No comment page numbers found in HTML, assuming page 1");
            1
        }
    }
}

/// Strip a single trailing slash from a base URL.
pub fn normalize_base_url(base_url: &str) -> &str {
    base_url.strip_suffix('/').unwrap_or(base_url)
}

/// URL of a single feed page.
pub fn page_url(base_url: &str, page: u32) -> String {
    format!("{}/comment-page-{}/", normalize_base_url(base_url), page)
}

/// Build the URLs of the `count` most recent pages, newest first.
///
/// Never produces pages below 1; a `count` of 0 is treated as 1.
pub fn build_page_urls(base_url: &str, latest_page: u32, count: u32) -> Vec<PageRef> {
    let latest = latest_page.max(1);
    let oldest = latest.saturating_sub(count.max(1) - 1).max(1);

    let pages: Vec<PageRef> = (oldest..=latest)
        .rev()
        .map(|number| PageRef {
            number,
            url: page_url(base_url, number),
        })
        .collect();

    debug!("Generated page URLs: {:?}", pages);
    pages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_page_is_max_across_links_and_clipboard() {
        let html = r#"
            <html><body>
              <a href="https://example.com/feed/comment-page-3/">3</a>
              <span data-wpd-clipboard="https://example.com/feed/comment-page-5/#comment-9">copy</span>
              <a href="/feed/comment-page-2/#comments">2</a>
              <a href="/feed/comment-page-3/">3 again</a>
            </body></html>
        "#;
        assert_eq!(locate_latest_page(html), 5);
    }

    #[test]
    fn test_no_page_references_defaults_to_one() {
        let html = r#"<html><body><a href="/about">about</a></body></html>"#;
        assert_eq!(locate_latest_page(html), 1);
        assert_eq!(locate_latest_page(""), 1);
    }

    #[test]
    fn test_page_zero_is_not_a_page() {
        assert_eq!(locate_latest_page(r#"<a href="/feed/comment-page-0/">0</a>"#), 1);
        let html = r#"
            <a href="/feed/comment-page-0/">0</a>
            <a href="/feed/comment-page-2/">2</a>
        "#;
        assert_eq!(locate_latest_page(html), 2);
    }

    #[test]
    fn test_ignores_unrelated_numbers() {
        let html = r#"
            <a href="/feed/page-99/">99</a>
            <a href="/feed/comment-page-4/">4</a>
            <div data-other="comment-page-50">ignored attribute</div>
        "#;
        assert_eq!(locate_latest_page(html), 4);
    }

    #[test]
    fn test_build_single_page_url_strips_trailing_slash() {
        let urls = build_page_urls("https://example.com/tc/feed/", 325, 1);
        assert_eq!(
            urls,
            vec![PageRef {
                number: 325,
                url: "https://example.com/tc/feed/comment-page-325/".to_string(),
            }]
        );
    }

    #[test]
    fn test_build_page_urls_newest_first() {
        let urls = build_page_urls("https://example.com/feed", 10, 3);
        let numbers: Vec<u32> = urls.iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![10, 9, 8]);
        assert_eq!(urls[2].url, "https://example.com/feed/comment-page-8/");
    }

    #[test]
    fn test_build_page_urls_stops_at_first_page() {
        let numbers: Vec<u32> = build_page_urls("https://example.com/feed", 2, 5)
            .into_iter()
            .map(|p| p.number)
            .collect();
        assert_eq!(numbers, vec![2, 1]);

        assert_eq!(build_page_urls("https://example.com/feed", 7, 0).len(), 1);
    }
}
