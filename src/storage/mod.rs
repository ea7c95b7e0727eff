//! Storage module for lexis
//!
//! Defines the capabilities the scheduler consumes (progress store, item
//! catalog, learner directory) and ships a SQLite backend plus an
//! in-memory one.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::StoreError;

pub mod catalog;
pub mod memory;
pub mod progress;

pub use catalog::{CatalogDb, VocabularyItem};
pub use memory::MemoryStore;
pub use progress::{ProgressDb, ProgressRecord};

/// Durable per-(learner, item) scheduling state
///
/// Implementations must make `find_or_create` atomic (never two records for
/// one pair) and `save` a compare-and-swap on `ProgressRecord::version`.
pub trait ProgressStore: Send + Sync {
    /// Records with `next_review_at <= now`, earliest due first
    fn find_due(&self, learner_id: &str, now: DateTime<Utc>) -> Result<Vec<ProgressRecord>, StoreError>;

    /// Existing record for the pair, or a freshly inserted one due at `now`
    fn find_or_create(
        &self,
        learner_id: &str,
        item_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ProgressRecord, StoreError>;

    /// Upsert `record`, returning its new version
    ///
    /// Fails with `StoreError::Conflict` when the stored version no longer
    /// matches `record.version`; the stored record is left untouched.
    fn save(&self, record: &ProgressRecord) -> Result<i64, StoreError>;

    fn all_for_learner(&self, learner_id: &str) -> Result<Vec<ProgressRecord>, StoreError>;
}

/// Read-only vocabulary reference data
pub trait ItemCatalog: Send + Sync {
    /// Items in `language_code` the learner has no progress record for,
    /// easiest then most common first
    fn find_unseen(
        &self,
        learner_id: &str,
        language_code: &str,
        limit: usize,
    ) -> Result<Vec<VocabularyItem>, StoreError>;

    fn get(&self, item_id: &str) -> Result<Option<VocabularyItem>, StoreError>;
}

/// Learner profile lookups
pub trait LearnerDirectory: Send + Sync {
    /// Language the learner is studying, if they have set one
    fn target_language(&self, learner_id: &str) -> Result<Option<String>, StoreError>;
}

/// Create tables and indexes if they don't exist
pub fn ensure_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS vocabulary (
            id TEXT PRIMARY KEY,
            word TEXT NOT NULL,
            translation TEXT NOT NULL,
            part_of_speech TEXT NOT NULL DEFAULT '',
            example_sentence TEXT NOT NULL DEFAULT '',
            pronunciation TEXT NOT NULL DEFAULT '',
            language_code TEXT NOT NULL DEFAULT 'it',
            difficulty_level INTEGER NOT NULL DEFAULT 1,
            frequency_rank INTEGER NOT NULL DEFAULT 1000,
            tags TEXT,
            notes TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS learners (
            id TEXT PRIMARY KEY,
            target_language TEXT NOT NULL,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        -- One row per (learner, item); created on first review, never deleted
        CREATE TABLE IF NOT EXISTS learner_progress (
            id TEXT PRIMARY KEY,
            learner_id TEXT NOT NULL,
            item_id TEXT NOT NULL,
            ease_factor REAL NOT NULL,
            interval_days INTEGER NOT NULL DEFAULT 0,
            repetitions INTEGER NOT NULL DEFAULT 0,
            next_review_at TEXT NOT NULL,
            last_reviewed_at TEXT,
            total_reviews INTEGER NOT NULL DEFAULT 0,
            correct_reviews INTEGER NOT NULL DEFAULT 0,
            mastery_level INTEGER NOT NULL DEFAULT 1,
            is_mastered INTEGER NOT NULL DEFAULT 0,
            response_time_avg_ms REAL NOT NULL DEFAULT 0,
            timed_reviews INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 0,
            UNIQUE(learner_id, item_id)
        );

        CREATE INDEX IF NOT EXISTS idx_progress_due ON learner_progress(learner_id, next_review_at);
        CREATE INDEX IF NOT EXISTS idx_vocabulary_order
            ON vocabulary(language_code, difficulty_level, frequency_rank);
        "#,
    )?;
    debug!("Schema ready");
    Ok(())
}

/// Open a connection with the busy timeout applied
pub(crate) fn open_connection(db_path: &Path, busy_timeout: Duration) -> Result<Connection, StoreError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(busy_timeout)?;
    // WAL mode for concurrent readers while a review is being written
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    ensure_schema(&conn)?;
    Ok(conn)
}

/// Fixed-width UTC timestamps so text comparison matches time order
pub(crate) fn to_db_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn from_db_time(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};

    #[test]
    fn test_db_time_orders_lexically() {
        let base = Utc.with_ymd_and_hms(2026, 1, 9, 23, 59, 59).unwrap();
        let later = base + ChronoDuration::milliseconds(1);
        let much_later = base + ChronoDuration::days(400);

        assert!(to_db_time(base) < to_db_time(later));
        assert!(to_db_time(later) < to_db_time(much_later));
        assert_eq!(to_db_time(base), "2026-01-09T23:59:59.000000Z");
    }

    #[test]
    fn test_db_time_parse() {
        let t = Utc.with_ymd_and_hms(2026, 5, 17, 8, 30, 0).unwrap();
        assert_eq!(from_db_time(0, &to_db_time(t)).unwrap(), t);
        assert!(from_db_time(0, "yesterday").is_err());
    }

    #[test]
    fn test_ensure_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        ensure_schema(&conn).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('vocabulary', 'learners', 'learner_progress')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 3);
    }
}
