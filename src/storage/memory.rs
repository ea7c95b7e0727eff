//! In-memory store
//!
//! Implements every storage capability over plain maps behind one mutex.
//! Used by tests and by embedders that keep their own persistence.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::{ItemCatalog, LearnerDirectory, ProgressRecord, ProgressStore, VocabularyItem};
use crate::error::StoreError;

#[derive(Default)]
struct MemoryState {
    /// Keyed by (learner_id, item_id)
    progress: HashMap<(String, String), ProgressRecord>,
    items: BTreeMap<String, VocabularyItem>,
    learners: HashMap<String, String>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: impl IntoIterator<Item = VocabularyItem>) -> Self {
        let state = MemoryState {
            items: items.into_iter().map(|item| (item.id.clone(), item)).collect(),
            ..MemoryState::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Simulate catalog drift
    pub fn remove_item(&self, item_id: &str) -> Result<Option<VocabularyItem>, StoreError> {
        Ok(self.lock()?.items.remove(item_id))
    }

    pub fn set_target_language(&self, learner_id: &str, language_code: &str) -> Result<(), StoreError> {
        self.lock()?
            .learners
            .insert(learner_id.to_string(), language_code.to_string());
        Ok(())
    }

    pub fn get(&self, learner_id: &str, item_id: &str) -> Result<Option<ProgressRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .progress
            .get(&(learner_id.to_string(), item_id.to_string()))
            .cloned())
    }

    pub fn progress_count(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.progress.len())
    }
}

impl ProgressStore for MemoryStore {
    fn find_due(&self, learner_id: &str, now: DateTime<Utc>) -> Result<Vec<ProgressRecord>, StoreError> {
        let state = self.lock()?;
        let mut due: Vec<ProgressRecord> = state
            .progress
            .values()
            .filter(|r| r.learner_id == learner_id && r.schedule.is_due(now))
            .cloned()
            .collect();
        due.sort_by(|a, b| {
            a.schedule
                .next_review_at
                .cmp(&b.schedule.next_review_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(due)
    }

    fn find_or_create(
        &self,
        learner_id: &str,
        item_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ProgressRecord, StoreError> {
        let mut state = self.lock()?;
        let record = state
            .progress
            .entry((learner_id.to_string(), item_id.to_string()))
            .or_insert_with(|| ProgressRecord::new(learner_id, item_id, now));
        Ok(record.clone())
    }

    fn save(&self, record: &ProgressRecord) -> Result<i64, StoreError> {
        let mut state = self.lock()?;
        let key = (record.learner_id.clone(), record.item_id.clone());
        let next_version = record.version + 1;

        if let Some(stored) = state.progress.get(&key) {
            if stored.version != record.version || stored.id != record.id {
                return Err(StoreError::Conflict {
                    record_id: record.id.clone(),
                });
            }
        }

        let mut saved = record.clone();
        saved.version = next_version;
        state.progress.insert(key, saved);
        Ok(next_version)
    }

    fn all_for_learner(&self, learner_id: &str) -> Result<Vec<ProgressRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .progress
            .values()
            .filter(|r| r.learner_id == learner_id)
            .cloned()
            .collect())
    }
}

impl ItemCatalog for MemoryStore {
    fn find_unseen(
        &self,
        learner_id: &str,
        language_code: &str,
        limit: usize,
    ) -> Result<Vec<VocabularyItem>, StoreError> {
        let state = self.lock()?;
        let mut unseen: Vec<&VocabularyItem> = state
            .items
            .values()
            .filter(|item| item.language_code == language_code)
            .filter(|item| {
                !state
                    .progress
                    .contains_key(&(learner_id.to_string(), item.id.clone()))
            })
            .collect();
        unseen.sort_by(|a, b| {
            a.difficulty_level
                .cmp(&b.difficulty_level)
                .then(a.frequency_rank.cmp(&b.frequency_rank))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(unseen.into_iter().take(limit).cloned().collect())
    }

    fn get(&self, item_id: &str) -> Result<Option<VocabularyItem>, StoreError> {
        Ok(self.lock()?.items.get(item_id).cloned())
    }
}

impl LearnerDirectory for MemoryStore {
    fn target_language(&self, learner_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock()?.learners.get(learner_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 2, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_save_conflict_on_stale_version() {
        let store = MemoryStore::new();
        let record = store.find_or_create("u1", "w1", now()).unwrap();

        assert_eq!(store.save(&record).unwrap(), 1);
        assert!(matches!(store.save(&record), Err(StoreError::Conflict { .. })));
    }

    #[test]
    fn test_with_items_seeds_catalog() {
        let items: Vec<VocabularyItem> = serde_json::from_str(
            r#"[{"id": "w1", "word": "gatto", "translation": "cat"},
                {"id": "w2", "word": "cane", "translation": "dog"}]"#,
        )
        .unwrap();
        let store = MemoryStore::with_items(items);

        assert_eq!(ItemCatalog::get(&store, "w2").unwrap().unwrap().word, "cane");
        assert_eq!(store.find_unseen("u1", "it", 10).unwrap().len(), 2);
    }

    #[test]
    fn test_find_due_sorted() {
        let store = MemoryStore::new();
        for (item, days) in [("b", -1), ("a", -3), ("c", 2)] {
            let mut record = store.find_or_create("u1", item, now()).unwrap();
            record.schedule.next_review_at = now() + Duration::days(days);
            store.save(&record).unwrap();
        }

        let due: Vec<String> = store
            .find_due("u1", now())
            .unwrap()
            .into_iter()
            .map(|r| r.item_id)
            .collect();
        assert_eq!(due, vec!["a", "b"]);
    }
}
