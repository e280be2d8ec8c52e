//! threadwatch - comment feed monitor.
//!
//! Watches a paginated, threaded comment feed, records every comment it
//! sees in a local ledger and posts one webhook alert per new comment.

pub mod cli;
pub mod config;
pub mod models;
pub mod monitor;
pub mod notifier;
pub mod repository;
pub mod schema;
pub mod scrapers;
pub mod utils;
