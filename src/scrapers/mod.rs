//! Page acquisition and comment extraction.
//!
//! - `locator`: finds the newest comment page and builds page URLs
//! - `parser`: turns rendered page HTML into flat comment records
//! - `fetch`: the [`PageFetcher`] seam plus its HTTP and browser engines

pub mod browser;
pub mod fetch;
mod http_client;
pub mod locator;
pub mod parser;

pub use browser::{BrowserEngineConfig, BrowserFetcher};
pub use fetch::{FetchError, PageFetcher};
pub use http_client::HttpFetcher;
pub use locator::{build_page_urls, locate_latest_page, normalize_base_url, page_url, PageRef};
pub use parser::{parse, parse_multiple, parse_report, PageHtml, ParseError, ParseReport};
