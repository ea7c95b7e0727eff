//! Session composition and review submission
//!
//! A session lists due reviews first (earliest due first), then tops up
//! with unseen items, easiest and most common first. Listing an item never
//! creates progress; only a submitted review does.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::sm2::{self, Quality, INITIAL_EASE_FACTOR};
use super::Scheduler;
use crate::error::{validate_id, EngineError, Result, StoreError};
use crate::storage::{ProgressRecord, VocabularyItem};

/// One entry of a review session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionItem {
    /// None for items the learner has never reviewed
    pub progress_id: Option<String>,
    pub item: VocabularyItem,
    pub ease_factor: f64,
    pub interval: u32,
    pub repetitions: u32,
    /// 0 for items the learner has never reviewed
    pub mastery_level: u8,
    pub next_review_at: Option<DateTime<Utc>>,
}

impl SessionItem {
    fn review(record: ProgressRecord, item: VocabularyItem) -> Self {
        Self {
            progress_id: Some(record.id),
            item,
            ease_factor: record.schedule.ease_factor,
            interval: record.schedule.interval,
            repetitions: record.schedule.repetitions,
            mastery_level: record.schedule.mastery_level.into(),
            next_review_at: Some(record.schedule.next_review_at),
        }
    }

    fn introduce(item: VocabularyItem) -> Self {
        Self {
            progress_id: None,
            item,
            ease_factor: INITIAL_EASE_FACTOR,
            interval: 0,
            repetitions: 0,
            mastery_level: 0,
            next_review_at: None,
        }
    }

    pub fn is_new(&self) -> bool {
        self.progress_id.is_none()
    }
}

/// What a graded review did to the item's schedule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewOutcome {
    pub progress_id: String,
    pub ease_factor: f64,
    pub interval: u32,
    pub repetitions: u32,
    pub next_review_at: DateTime<Utc>,
    pub mastery_level: sm2::MasteryLevel,
    pub is_mastered: bool,
}

impl From<&ProgressRecord> for ReviewOutcome {
    fn from(record: &ProgressRecord) -> Self {
        Self {
            progress_id: record.id.clone(),
            ease_factor: record.schedule.ease_factor,
            interval: record.schedule.interval,
            repetitions: record.schedule.repetitions,
            next_review_at: record.schedule.next_review_at,
            mastery_level: record.schedule.mastery_level,
            is_mastered: record.is_mastered(),
        }
    }
}

impl<'a> Scheduler<'a> {
    /// Up to `target_size` items for the learner, due reviews first
    pub fn compose_session(&self, learner_id: &str, target_size: usize) -> Result<Vec<SessionItem>> {
        self.compose_session_at(learner_id, target_size, Utc::now())
    }

    pub fn compose_session_at(
        &self,
        learner_id: &str,
        target_size: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionItem>> {
        validate_id("learner_id", learner_id)?;
        if target_size == 0 {
            return Ok(Vec::new());
        }

        let due = self.progress.find_due(learner_id, now)?;
        let due_count = due.len().min(target_size);
        let mut session = Vec::with_capacity(due_count);

        for record in due.into_iter().take(target_size) {
            match self.catalog.get(&record.item_id)? {
                Some(item) => session.push(SessionItem::review(record, item)),
                None => warn!(
                    "Skipping progress {}: item {} is no longer in the catalog",
                    record.id, record.item_id
                ),
            }
        }

        if due_count < target_size {
            let deficit = target_size - due_count;
            let language = self.target_language(learner_id)?;
            let fresh = self.catalog.find_unseen(learner_id, &language, deficit)?;
            debug!("Topping up with {} of {} new '{}' items", fresh.len(), deficit, language);
            session.extend(fresh.into_iter().map(SessionItem::introduce));
        }

        info!(
            "Composed session for {}: {} items ({} due)",
            learner_id,
            session.len(),
            session.iter().filter(|s| !s.is_new()).count()
        );
        Ok(session)
    }

    /// Grade one review and persist the new schedule
    ///
    /// `response_time_ms` only feeds the running average, never scheduling.
    pub fn submit_review(
        &self,
        learner_id: &str,
        item_id: &str,
        quality: i64,
        response_time_ms: Option<u64>,
    ) -> Result<ReviewOutcome> {
        self.submit_review_at(learner_id, item_id, quality, response_time_ms, Utc::now())
    }

    pub fn submit_review_at(
        &self,
        learner_id: &str,
        item_id: &str,
        quality: i64,
        response_time_ms: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<ReviewOutcome> {
        validate_id("learner_id", learner_id)?;
        validate_id("item_id", item_id)?;
        let quality = Quality::new(quality)?;

        if self.catalog.get(item_id)?.is_none() {
            return Err(EngineError::ItemNotFound(item_id.to_string()));
        }

        let record = match self.apply_review(learner_id, item_id, quality, response_time_ms, now) {
            Err(StoreError::Conflict { record_id }) => {
                warn!("Concurrent update on progress {}, retrying once", record_id);
                match self.apply_review(learner_id, item_id, quality, response_time_ms, now) {
                    Err(StoreError::Conflict { .. }) => {
                        return Err(EngineError::Conflict {
                            learner_id: learner_id.to_string(),
                            item_id: item_id.to_string(),
                        })
                    }
                    other => other?,
                }
            }
            other => other?,
        };

        debug!(
            "Reviewed {}/{} q={}: interval {}d, ease {:.2}, mastery {}",
            learner_id,
            item_id,
            quality.value(),
            record.schedule.interval,
            record.schedule.ease_factor,
            record.schedule.mastery_level.as_str()
        );
        Ok(ReviewOutcome::from(&record))
    }

    /// One read-grade-write attempt; the write is all-or-nothing
    fn apply_review(
        &self,
        learner_id: &str,
        item_id: &str,
        quality: Quality,
        response_time_ms: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<ProgressRecord, StoreError> {
        let mut record = self.progress.find_or_create(learner_id, item_id, now)?;
        record.schedule = sm2::advance(&record.schedule, quality, now);
        if let Some(ms) = response_time_ms {
            record.record_response_time(ms);
        }
        record.version = self.progress.save(&record)?;
        Ok(record)
    }
}
