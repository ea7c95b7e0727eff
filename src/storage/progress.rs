//! Learner progress storage
//!
//! One row per (learner, item) holding the SM-2 schedule and review
//! counters. Writes are guarded by a version column so two concurrent
//! reviews of the same pair cannot silently overwrite each other.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use super::{from_db_time, open_connection, to_db_time, ProgressStore};
use crate::error::StoreError;
use crate::scheduler::sm2::{MasteryLevel, Schedule};

/// Scheduling state of one item for one learner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub id: String,
    pub learner_id: String,
    pub item_id: String,
    #[serde(flatten)]
    pub schedule: Schedule,
    /// Running mean over the reviews that reported a response time
    pub response_time_avg_ms: f64,
    pub timed_reviews: u32,
    pub created_at: DateTime<Utc>,
    /// Optimistic-concurrency token, bumped on every save
    pub version: i64,
}

impl ProgressRecord {
    /// Unsaved record for a pair the learner has never reviewed
    pub fn new(learner_id: &str, item_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            learner_id: learner_id.to_string(),
            item_id: item_id.to_string(),
            schedule: Schedule::initial(now),
            response_time_avg_ms: 0.0,
            timed_reviews: 0,
            created_at: now,
            version: 0,
        }
    }

    pub fn is_mastered(&self) -> bool {
        self.schedule.is_mastered()
    }

    /// Fold one response time into the running average
    pub fn record_response_time(&mut self, response_time_ms: u64) {
        self.timed_reviews += 1;
        let n = self.timed_reviews as f64;
        self.response_time_avg_ms += (response_time_ms as f64 - self.response_time_avg_ms) / n;
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, learner_id, item_id, ease_factor, interval_days, repetitions,
           next_review_at, last_reviewed_at, total_reviews, correct_reviews,
           mastery_level, response_time_avg_ms, timed_reviews, created_at, version
    FROM learner_progress
"#;

fn map_record(row: &Row<'_>) -> rusqlite::Result<ProgressRecord> {
    let mastery: u8 = row.get(10)?;
    let mastery_level = MasteryLevel::try_from(mastery).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Integer, e.into())
    })?;
    let last_reviewed_at = match row.get::<_, Option<String>>(7)? {
        Some(raw) => Some(from_db_time(7, &raw)?),
        None => None,
    };

    Ok(ProgressRecord {
        id: row.get(0)?,
        learner_id: row.get(1)?,
        item_id: row.get(2)?,
        schedule: Schedule {
            ease_factor: row.get(3)?,
            interval: row.get(4)?,
            repetitions: row.get(5)?,
            next_review_at: from_db_time(6, &row.get::<_, String>(6)?)?,
            last_reviewed_at,
            total_reviews: row.get(8)?,
            correct_reviews: row.get(9)?,
            mastery_level,
        },
        response_time_avg_ms: row.get(11)?,
        timed_reviews: row.get(12)?,
        created_at: from_db_time(13, &row.get::<_, String>(13)?)?,
        version: row.get(14)?,
    })
}

fn find_pair(conn: &Connection, learner_id: &str, item_id: &str) -> rusqlite::Result<Option<ProgressRecord>> {
    conn.prepare_cached(&format!("{} WHERE learner_id = ?1 AND item_id = ?2", SELECT_COLUMNS))?
        .query_row(params![learner_id, item_id], map_record)
        .optional()
}

fn insert_record(conn: &Connection, record: &ProgressRecord, version: i64) -> rusqlite::Result<usize> {
    let s = &record.schedule;
    conn.execute(
        r#"
        INSERT INTO learner_progress
        (id, learner_id, item_id, ease_factor, interval_days, repetitions, next_review_at,
         last_reviewed_at, total_reviews, correct_reviews, mastery_level, is_mastered,
         response_time_avg_ms, timed_reviews, created_at, version)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
        ON CONFLICT(learner_id, item_id) DO NOTHING
        "#,
        params![
            record.id,
            record.learner_id,
            record.item_id,
            s.ease_factor,
            s.interval,
            s.repetitions,
            to_db_time(s.next_review_at),
            s.last_reviewed_at.map(to_db_time),
            s.total_reviews,
            s.correct_reviews,
            u8::from(s.mastery_level),
            s.is_mastered(),
            record.response_time_avg_ms,
            record.timed_reviews,
            to_db_time(record.created_at),
            version,
        ],
    )
}

/// Progress store backed by SQLite
pub struct ProgressDb {
    conn: Mutex<Connection>,
}

impl ProgressDb {
    /// Open or create a progress store at the given path
    pub fn open(db_path: &Path, busy_timeout: Duration) -> Result<Self, StoreError> {
        let conn = open_connection(db_path, busy_timeout)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Record for one pair, if the learner has reviewed the item
    pub fn get(&self, learner_id: &str, item_id: &str) -> Result<Option<ProgressRecord>, StoreError> {
        let conn = self.lock()?;
        Ok(find_pair(&conn, learner_id, item_id)?)
    }

    /// Total progress rows across all learners
    pub fn count(&self) -> Result<i64, StoreError> {
        let conn = self.lock()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM learner_progress", [], |row| row.get(0))?)
    }
}

impl ProgressStore for ProgressDb {
    fn find_due(&self, learner_id: &str, now: DateTime<Utc>) -> Result<Vec<ProgressRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&format!(
            "{} WHERE learner_id = ?1 AND next_review_at <= ?2 ORDER BY next_review_at ASC, id ASC",
            SELECT_COLUMNS
        ))?;

        let records = stmt.query_map(params![learner_id, to_db_time(now)], map_record)?;
        records.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn find_or_create(
        &self,
        learner_id: &str,
        item_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ProgressRecord, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let fresh = ProgressRecord::new(learner_id, item_id, now);
        if insert_record(&tx, &fresh, 0)? > 0 {
            debug!("Created progress record {} for {}/{}", fresh.id, learner_id, item_id);
        }

        let record = find_pair(&tx, learner_id, item_id)?
            .ok_or_else(|| StoreError::Corrupt(format!("progress row for {}/{} vanished", learner_id, item_id)))?;
        tx.commit()?;
        Ok(record)
    }

    fn save(&self, record: &ProgressRecord) -> Result<i64, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let s = &record.schedule;
        let next_version = record.version + 1;

        let changes = tx.execute(
            r#"
            UPDATE learner_progress SET
                ease_factor = ?1,
                interval_days = ?2,
                repetitions = ?3,
                next_review_at = ?4,
                last_reviewed_at = ?5,
                total_reviews = ?6,
                correct_reviews = ?7,
                mastery_level = ?8,
                is_mastered = ?9,
                response_time_avg_ms = ?10,
                timed_reviews = ?11,
                version = ?12
            WHERE id = ?13 AND version = ?14
            "#,
            params![
                s.ease_factor,
                s.interval,
                s.repetitions,
                to_db_time(s.next_review_at),
                s.last_reviewed_at.map(to_db_time),
                s.total_reviews,
                s.correct_reviews,
                u8::from(s.mastery_level),
                s.is_mastered(),
                record.response_time_avg_ms,
                record.timed_reviews,
                next_version,
                record.id,
                record.version,
            ],
        )?;

        if changes == 0 {
            let exists = tx
                .query_row(
                    "SELECT 1 FROM learner_progress WHERE id = ?1 OR (learner_id = ?2 AND item_id = ?3)",
                    params![record.id, record.learner_id, record.item_id],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();

            if exists {
                return Err(StoreError::Conflict {
                    record_id: record.id.clone(),
                });
            }
            insert_record(&tx, record, next_version)?;
        }

        tx.commit()?;
        Ok(next_version)
    }

    fn all_for_learner(&self, learner_id: &str) -> Result<Vec<ProgressRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&format!("{} WHERE learner_id = ?1", SELECT_COLUMNS))?;

        let records = stmt.query_map(params![learner_id], map_record)?;
        records.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::sm2::{advance, latest_review_at, Quality, MAX_INTERVAL_DAYS};
    use chrono::{Duration as ChronoDuration, TimeZone};
    use tempfile::NamedTempFile;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 2, 12, 0, 0).unwrap()
    }

    fn setup_test_db() -> (NamedTempFile, ProgressDb) {
        let tmp = NamedTempFile::new().unwrap();
        let store = ProgressDb::open(tmp.path(), Duration::from_millis(500)).unwrap();
        (tmp, store)
    }

    #[test]
    fn test_find_or_create_is_idempotent() {
        let (_tmp, store) = setup_test_db();

        let first = store.find_or_create("u1", "w1", now()).unwrap();
        let second = store.find_or_create("u1", "w1", now() + ChronoDuration::hours(1)).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.schedule.next_review_at, now());
        assert_eq!(second.schedule.ease_factor, 2.5);
        assert_eq!(second.version, 0);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_save_roundtrip_and_version() {
        let (_tmp, store) = setup_test_db();

        let mut record = store.find_or_create("u1", "w1", now()).unwrap();
        record.schedule = advance(&record.schedule, Quality::new(5).unwrap(), now());
        record.record_response_time(1200);
        record.version = store.save(&record).unwrap();
        assert_eq!(record.version, 1);

        let loaded = store.get("u1", "w1").unwrap().unwrap();
        assert_eq!(loaded, record);
        assert!(loaded.schedule.interval >= 1);
    }

    #[test]
    fn test_save_stale_version_conflicts() {
        let (_tmp, store) = setup_test_db();

        let original = store.find_or_create("u1", "w1", now()).unwrap();
        let mut a = original.clone();
        let mut b = original.clone();

        a.schedule = advance(&a.schedule, Quality::new(4).unwrap(), now());
        store.save(&a).unwrap();

        b.schedule = advance(&b.schedule, Quality::new(1).unwrap(), now());
        let err = store.save(&b).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        // Loser left no trace
        let loaded = store.get("u1", "w1").unwrap().unwrap();
        assert_eq!(loaded.schedule.repetitions, 1);
        assert_eq!(loaded.schedule.total_reviews, 1);
    }

    #[test]
    fn test_save_inserts_missing_record() {
        let (_tmp, store) = setup_test_db();

        let record = ProgressRecord::new("u2", "w9", now());
        assert_eq!(store.save(&record).unwrap(), 1);
        assert_eq!(store.get("u2", "w9").unwrap().unwrap().id, record.id);
    }

    #[test]
    fn test_find_due_ordering() {
        let (_tmp, store) = setup_test_db();

        for (item, offset_days) in [("late", -1), ("early", -5), ("future", 3), ("middle", -2)] {
            let mut record = store.find_or_create("u1", item, now()).unwrap();
            record.schedule.next_review_at = now() + ChronoDuration::days(offset_days);
            store.save(&record).unwrap();
        }
        store.find_or_create("u2", "other", now() - ChronoDuration::days(9)).unwrap();

        let due: Vec<String> = store
            .find_due("u1", now())
            .unwrap()
            .into_iter()
            .map(|r| r.item_id)
            .collect();
        assert_eq!(due, vec!["early", "middle", "late"]);
        assert_eq!(store.all_for_learner("u1").unwrap().len(), 4);
    }

    #[test]
    fn test_long_review_runs_roundtrip() {
        let (_tmp, store) = setup_test_db();
        let patterns: [&[i64]; 3] = [&[5], &[4, 5, 5, 3], &[5, 5, 5, 5, 5, 5, 1]];

        for (n, pattern) in patterns.iter().enumerate() {
            let item = format!("w{}", n);
            let mut record = store.find_or_create("u1", &item, now()).unwrap();
            for value in pattern.iter().cycle().take(60) {
                record.schedule = advance(&record.schedule, Quality::new(*value).unwrap(), now());
                record.version = store.save(&record).unwrap();

                assert!(record.schedule.interval >= 1);
                assert!(record.schedule.interval <= MAX_INTERVAL_DAYS);
                assert_eq!(store.get("u1", &item).unwrap().unwrap(), record);
            }
        }

        assert_eq!(store.all_for_learner("u1").unwrap().len(), 3);
        assert!(store.find_due("u1", now()).unwrap().is_empty());
        assert_eq!(store.find_due("u1", latest_review_at()).unwrap().len(), 3);
    }

    #[test]
    fn test_record_response_time_average() {
        let mut record = ProgressRecord::new("u1", "w1", now());
        record.record_response_time(1000);
        record.record_response_time(2000);
        record.record_response_time(3000);
        assert_eq!(record.timed_reviews, 3);
        assert!((record.response_time_avg_ms - 2000.0).abs() < 1e-9);
    }

    #[test]
    fn test_concurrent_find_or_create_single_row() {
        let (_tmp, store) = setup_test_db();
        let store = std::sync::Arc::new(store);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.find_or_create("u1", "w1", now()).unwrap().id)
            })
            .collect();

        let ids: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(store.count().unwrap(), 1);
    }
}
