//! The shared ledger connection.
//!
//! Opened once at startup and handed to every component that needs it.
//! Holding the connection behind a mutex lets a caller run several
//! statements as one uninterrupted sequence.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use diesel::sqlite::SqliteConnection;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::{AsyncConnection, SimpleAsyncConnection};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use super::StoreError;

/// Async SQLite connection using SyncConnectionWrapper.
pub type AsyncSqliteConnection = SyncConnectionWrapper<SqliteConnection>;

pub(crate) const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS comments (
    id INTEGER PRIMARY KEY,
    page_number INTEGER NOT NULL,
    author TEXT NOT NULL,
    content TEXT NOT NULL,
    timestamp TEXT NOT NULL DEFAULT '',
    parent_id INTEGER,
    url TEXT NOT NULL,
    first_seen_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_first_seen ON comments(first_seen_at);
CREATE INDEX IF NOT EXISTS idx_page_number ON comments(page_number);
"#;

/// Handle to the comment ledger database.
///
/// Cloning is cheap; every clone shares the same connection.
#[derive(Clone)]
pub struct Ledger {
    conn: Arc<Mutex<AsyncSqliteConnection>>,
    path: PathBuf,
}

impl Ledger {
    /// Open (creating if needed) the ledger at `path` and ensure the schema.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let database_url = path.display().to_string();
        let mut conn = AsyncSqliteConnection::establish(&database_url)
            .await
            .map_err(|e| StoreError::Connection(format!("{}: {}", database_url, e)))?;

        conn.batch_execute(SCHEMA).await?;
        info!("Ledger ready at {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: path.to_path_buf(),
        })
    }

    /// Location of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Exclusive access to the connection until the guard is dropped.
    pub(crate) async fn lock(&self) -> MutexGuard<'_, AsyncSqliteConnection> {
        self.conn.lock().await
    }

    /// Release this handle. The connection closes with the last clone.
    pub fn close(self) {
        let others = Arc::strong_count(&self.conn) - 1;
        debug!(
            "Closing ledger handle for {} ({} other handles remain)",
            self.path.display(),
            others
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_open_creates_parent_dirs_and_is_reopenable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("data").join("comments.db");

        let ledger = Ledger::open(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(ledger.path(), path.as_path());
        ledger.close();

        // Schema creation is idempotent.
        let again = Ledger::open(&path).await.unwrap();
        again.close();
    }
}
