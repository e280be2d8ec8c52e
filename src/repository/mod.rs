//! Persistent comment ledger.
//!
//! A single SQLite database holds every comment ever seen. The [`Ledger`]
//! owns the one shared connection; [`CommentStore`] implements the
//! novelty and retention queries on top of it.

mod comments;
mod ledger;
mod models;

pub use comments::CommentStore;
pub use ledger::{AsyncSqliteConnection, Ledger};
#[cfg(test)]
pub(crate) use ledger::SCHEMA;

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use crate::models::CommentId;

/// Diesel error type alias.
pub type DieselError = diesel::result::Error;

/// Ledger I/O or integrity failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] DieselError),
    #[error("comment {0} is already in the ledger")]
    Duplicate(CommentId),
    #[error("failed to open ledger: {0}")]
    Connection(String),
    #[error("ledger I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Format a timestamp the way `first_seen_at` is stored.
///
/// Fixed-width UTC with millisecond precision, so text order equals time
/// order and range filters can compare strings directly.
pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a datetime string from the database.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_datetime_format_is_fixed_width_and_round_trips() {
        let dt = Utc.with_ymd_and_hms(2024, 5, 1, 9, 3, 7).unwrap();
        let text = format_datetime(dt);
        assert_eq!(text, "2024-05-01T09:03:07.000Z");
        assert_eq!(parse_datetime(&text), dt);
    }

    #[test]
    fn test_unparseable_datetime_falls_back_to_epoch() {
        assert_eq!(parse_datetime("yesterday"), DateTime::UNIX_EPOCH);
    }
}
