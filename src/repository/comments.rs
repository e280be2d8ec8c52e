//! Comment ledger queries.
//!
//! The ledger is append-only: rows are inserted once and only ever removed
//! by the retention purge.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use diesel_async::{AsyncConnection, RunQueryDsl};
use tracing::{debug, info};

use super::ledger::{AsyncSqliteConnection, Ledger};
use super::models::{CommentRecord, NewComment};
use super::{format_datetime, DieselError, StoreError};
use crate::models::{Comment, CommentId, StoredComment};
use crate::schema::comments;

/// Keeps `IN (...)` lists well under SQLite's bound-parameter limit.
const ID_CHUNK: usize = 500;

/// Novelty and retention queries over the shared [`Ledger`].
#[derive(Clone)]
pub struct CommentStore {
    ledger: Ledger,
}

impl CommentStore {
    pub fn new(ledger: Ledger) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Check if a comment id is in the ledger.
    pub async fn exists(&self, id: CommentId) -> Result<bool, StoreError> {
        let mut conn = self.ledger.lock().await;

        let count: i64 = comments::table
            .filter(comments::id.eq(id))
            .count()
            .get_result(&mut *conn)
            .await?;

        Ok(count > 0)
    }

    /// Get a stored comment by id.
    pub async fn get(&self, id: CommentId) -> Result<Option<StoredComment>, StoreError> {
        let mut conn = self.ledger.lock().await;

        let record = comments::table
            .find(id)
            .select(CommentRecord::as_select())
            .first(&mut *conn)
            .await
            .optional()?;

        Ok(record.map(StoredComment::from))
    }

    /// Persist a batch of comments in one transaction, stamped with the
    /// current time.
    ///
    /// Fails with [`StoreError::Duplicate`] if any id is already stored; in
    /// that case nothing from the batch is written.
    pub async fn insert_many(&self, batch: &[Comment]) -> Result<(), StoreError> {
        self.insert_many_seen_at(batch, Utc::now()).await
    }

    /// [`insert_many`](Self::insert_many) with an explicit ingestion time.
    pub async fn insert_many_seen_at(
        &self,
        batch: &[Comment],
        seen_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let seen_at = format_datetime(seen_at);
        let mut conn = self.ledger.lock().await;

        conn.transaction::<_, StoreError, _>(|conn| {
            Box::pin(async move { insert_rows(conn, batch, &seen_at).await })
        })
        .await?;

        debug!("Inserted {} comments", batch.len());
        Ok(())
    }

    /// Candidates whose id is not in the ledger, in input order.
    ///
    /// A repeated id within `candidates` is kept only at its first
    /// occurrence, so the result can always be passed to
    /// [`insert_many`](Self::insert_many). Read-only.
    pub async fn filter_new(&self, candidates: &[Comment]) -> Result<Vec<Comment>, StoreError> {
        let mut conn = self.ledger.lock().await;
        select_unseen(&mut conn, candidates).await
    }

    /// Filter and persist in one step, holding the ledger for the whole
    /// sequence so no other write can land between the two.
    ///
    /// Returns the comments that were new and are now stored.
    pub async fn record_new(&self, candidates: &[Comment]) -> Result<Vec<Comment>, StoreError> {
        let seen_at = format_datetime(Utc::now());
        let mut conn = self.ledger.lock().await;

        let fresh = conn
            .transaction::<_, StoreError, _>(|conn| {
                Box::pin(async move {
                    let fresh = select_unseen(conn, candidates).await?;
                    insert_rows(conn, &fresh, &seen_at).await?;
                    Ok(fresh)
                })
            })
            .await?;

        debug!(
            "Recorded {} new of {} candidate comments",
            fresh.len(),
            candidates.len()
        );
        Ok(fresh)
    }

    /// Total number of stored comments.
    pub async fn count(&self) -> Result<i64, StoreError> {
        let mut conn = self.ledger.lock().await;
        Ok(comments::table.count().get_result(&mut *conn).await?)
    }

    /// Delete comments first seen more than `days` days ago.
    ///
    /// Age is measured from ingestion time, never from the comment's own
    /// posted-time text.
    pub async fn purge_older_than(&self, days: u32) -> Result<usize, StoreError> {
        self.purge_before(Utc::now() - Duration::days(i64::from(days)))
            .await
    }

    /// Delete comments first seen before `cutoff`.
    pub async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let cutoff = format_datetime(cutoff);
        let mut conn = self.ledger.lock().await;

        let removed = diesel::delete(comments::table.filter(comments::first_seen_at.lt(&cutoff)))
            .execute(&mut *conn)
            .await?;

        if removed > 0 {
            info!("Purged {} comments first seen before {}", removed, cutoff);
        }
        Ok(removed)
    }

    /// The most recently ingested comments, newest first.
    pub async fn recent(&self, limit: i64) -> Result<Vec<StoredComment>, StoreError> {
        let mut conn = self.ledger.lock().await;

        let records = comments::table
            .select(CommentRecord::as_select())
            .order((comments::first_seen_at.desc(), comments::id.desc()))
            .limit(limit)
            .load(&mut *conn)
            .await?;

        Ok(records.into_iter().map(StoredComment::from).collect())
    }
}

async fn select_unseen(
    conn: &mut AsyncSqliteConnection,
    candidates: &[Comment],
) -> Result<Vec<Comment>, StoreError> {
    let ids: Vec<CommentId> = candidates.iter().map(|c| c.id).collect();

    let mut known: HashSet<CommentId> = HashSet::new();
    for chunk in ids.chunks(ID_CHUNK) {
        let found: Vec<CommentId> = comments::table
            .select(comments::id)
            .filter(comments::id.eq_any(chunk))
            .load(conn)
            .await?;
        known.extend(found);
    }

    let mut taken: HashSet<CommentId> = HashSet::new();
    Ok(candidates
        .iter()
        .filter(|c| !known.contains(&c.id) && taken.insert(c.id))
        .cloned()
        .collect())
}

/// Insert rows one at a time so a uniqueness failure names the offending id.
/// Callers wrap this in a transaction.
async fn insert_rows(
    conn: &mut AsyncSqliteConnection,
    batch: &[Comment],
    seen_at: &str,
) -> Result<(), StoreError> {
    for comment in batch {
        diesel::insert_into(comments::table)
            .values(NewComment::new(comment, seen_at))
            .execute(conn)
            .await
            .map_err(|e| match e {
                DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                    StoreError::Duplicate(comment.id)
                }
                other => StoreError::Database(other),
            })?;
    }
    Ok(())
}
