//! Vocabulary catalog and learner profiles
//!
//! Reference data the scheduler reads but never writes during a session.
//! Items are seeded in bulk from JSON with `lexis import`.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::info;

use super::{open_connection, ItemCatalog, LearnerDirectory};
use crate::error::{validate_id, StoreError};

fn default_language() -> String {
    "it".to_string()
}

fn default_difficulty() -> u8 {
    1
}

fn default_frequency_rank() -> u32 {
    1000
}

/// A vocabulary word with its translation and ranking metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyItem {
    pub id: String,
    pub word: String,
    pub translation: String,
    #[serde(default)]
    pub part_of_speech: String,
    #[serde(default)]
    pub example_sentence: String,
    #[serde(default)]
    pub pronunciation: String,
    #[serde(default = "default_language")]
    pub language_code: String,
    /// 1 = easy .. 5 = hard
    #[serde(default = "default_difficulty")]
    pub difficulty_level: u8,
    /// Lower = more common
    #[serde(default = "default_frequency_rank")]
    pub frequency_rank: u32,
    /// Comma-separated tags
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, word, translation, part_of_speech, example_sentence, pronunciation,
           language_code, difficulty_level, frequency_rank, tags, notes
    FROM vocabulary
"#;

fn map_item(row: &Row<'_>) -> rusqlite::Result<VocabularyItem> {
    Ok(VocabularyItem {
        id: row.get(0)?,
        word: row.get(1)?,
        translation: row.get(2)?,
        part_of_speech: row.get(3)?,
        example_sentence: row.get(4)?,
        pronunciation: row.get(5)?,
        language_code: row.get(6)?,
        difficulty_level: row.get(7)?,
        frequency_rank: row.get(8)?,
        tags: row.get(9)?,
        notes: row.get(10)?,
    })
}

/// Catalog and learner directory backed by SQLite
pub struct CatalogDb {
    conn: Mutex<Connection>,
}

impl CatalogDb {
    /// Open or create the catalog at the given database path
    pub fn open(db_path: &Path, busy_timeout: Duration) -> Result<Self, StoreError> {
        let conn = open_connection(db_path, busy_timeout)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Batch upsert items in a single transaction
    pub fn upsert_items(&self, items: &[VocabularyItem]) -> Result<usize, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let mut written = 0;
        {
            let mut stmt = tx.prepare_cached(
                r#"
                INSERT INTO vocabulary
                (id, word, translation, part_of_speech, example_sentence, pronunciation,
                 language_code, difficulty_level, frequency_rank, tags, notes)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                ON CONFLICT(id) DO UPDATE SET
                    word = excluded.word,
                    translation = excluded.translation,
                    part_of_speech = excluded.part_of_speech,
                    example_sentence = excluded.example_sentence,
                    pronunciation = excluded.pronunciation,
                    language_code = excluded.language_code,
                    difficulty_level = excluded.difficulty_level,
                    frequency_rank = excluded.frequency_rank,
                    tags = excluded.tags,
                    notes = excluded.notes,
                    updated_at = CURRENT_TIMESTAMP
                "#,
            )?;

            for item in items {
                written += stmt.execute(params![
                    item.id,
                    item.word,
                    item.translation,
                    item.part_of_speech,
                    item.example_sentence,
                    item.pronunciation,
                    item.language_code,
                    item.difficulty_level,
                    item.frequency_rank,
                    item.tags,
                    item.notes,
                ])?;
            }
        }

        tx.commit()?;
        Ok(written)
    }

    /// Item count per language code
    pub fn count_by_language(&self) -> Result<Vec<(String, i64)>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT language_code, COUNT(*) FROM vocabulary GROUP BY language_code ORDER BY COUNT(*) DESC",
        )?;
        let counts = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        counts.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Set the language a learner is studying
    pub fn set_target_language(&self, learner_id: &str, language_code: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO learners (id, target_language) VALUES (?1, ?2)
            ON CONFLICT(id) DO UPDATE SET
                target_language = excluded.target_language,
                updated_at = CURRENT_TIMESTAMP
            "#,
            params![learner_id, language_code],
        )?;
        Ok(())
    }
}

impl ItemCatalog for CatalogDb {
    fn find_unseen(
        &self,
        learner_id: &str,
        language_code: &str,
        limit: usize,
    ) -> Result<Vec<VocabularyItem>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&format!(
            r#"{}
            WHERE language_code = ?2
              AND NOT EXISTS (
                  SELECT 1 FROM learner_progress p
                  WHERE p.learner_id = ?1 AND p.item_id = vocabulary.id
              )
            ORDER BY difficulty_level ASC, frequency_rank ASC, id ASC
            LIMIT ?3
            "#,
            SELECT_COLUMNS
        ))?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let items = stmt.query_map(params![learner_id, language_code, limit], map_item)?;
        items.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn get(&self, item_id: &str) -> Result<Option<VocabularyItem>, StoreError> {
        let conn = self.lock()?;
        let item = conn
            .prepare_cached(&format!("{} WHERE id = ?1", SELECT_COLUMNS))?
            .query_row(params![item_id], map_item)
            .optional()?;
        Ok(item)
    }
}

impl LearnerDirectory for CatalogDb {
    fn target_language(&self, learner_id: &str) -> Result<Option<String>, StoreError> {
        let conn = self.lock()?;
        let language = conn
            .query_row(
                "SELECT target_language FROM learners WHERE id = ?1",
                params![learner_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(language)
    }
}

/// Read a JSON array of items from `path` and upsert them
pub fn import_items(catalog: &CatalogDb, path: &Path) -> Result<usize> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading vocabulary file {:?}", path))?;
    let items: Vec<VocabularyItem> = serde_json::from_str(&content)
        .with_context(|| format!("parsing vocabulary file {:?}", path))?;

    for item in &items {
        validate_id("item id", &item.id)?;
    }

    let written = catalog.upsert_items(&items)?;
    info!("Imported {} vocabulary items from {:?}", written, path);
    Ok(written)
}
