//! Learner statistics
//!
//! Read-only summary over all of a learner's progress records.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use super::sm2::MasteryLevel;
use super::Scheduler;
use crate::error::{validate_id, Result};
use crate::storage::ProgressRecord;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearnerStatistics {
    pub total_items: usize,
    pub total_reviews: u64,
    pub correct_reviews: u64,
    /// Percentage, two decimals; 0 when nothing has been reviewed
    pub accuracy_rate: f64,
    pub due_count: usize,
    pub mastered_items: usize,
    pub mastery_distribution: BTreeMap<MasteryLevel, usize>,
    /// 0 when the learner has no records
    pub average_ease_factor: f64,
}

/// Summarize `records` as of `now`
pub fn aggregate(records: &[ProgressRecord], now: DateTime<Utc>) -> LearnerStatistics {
    let total_reviews: u64 = records.iter().map(|r| r.schedule.total_reviews as u64).sum();
    let correct_reviews: u64 = records.iter().map(|r| r.schedule.correct_reviews as u64).sum();

    let accuracy_rate = if total_reviews > 0 {
        let rate = correct_reviews as f64 / total_reviews as f64 * 100.0;
        (rate * 100.0).round() / 100.0
    } else {
        0.0
    };

    let mut mastery_distribution = BTreeMap::new();
    for record in records {
        *mastery_distribution.entry(record.schedule.mastery_level).or_insert(0) += 1;
    }

    let average_ease_factor = if records.is_empty() {
        0.0
    } else {
        records.iter().map(|r| r.schedule.ease_factor).sum::<f64>() / records.len() as f64
    };

    LearnerStatistics {
        total_items: records.len(),
        total_reviews,
        correct_reviews,
        accuracy_rate,
        due_count: records.iter().filter(|r| r.schedule.is_due(now)).count(),
        mastered_items: records.iter().filter(|r| r.is_mastered()).count(),
        mastery_distribution,
        average_ease_factor,
    }
}

impl<'a> Scheduler<'a> {
    pub fn statistics(&self, learner_id: &str) -> Result<LearnerStatistics> {
        self.statistics_at(learner_id, Utc::now())
    }

    pub fn statistics_at(&self, learner_id: &str, now: DateTime<Utc>) -> Result<LearnerStatistics> {
        validate_id("learner_id", learner_id)?;
        let records = self.progress.all_for_learner(learner_id)?;
        Ok(aggregate(&records, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::scheduler::sm2::{advance, Quality};
    use crate::storage::{MemoryStore, VocabularyItem};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 1, 18, 0, 0).unwrap()
    }

    fn reviewed(item_id: &str, qualities: &[i64]) -> ProgressRecord {
        let mut record = ProgressRecord::new("u1", item_id, now());
        for &q in qualities {
            record.schedule = advance(&record.schedule, Quality::new(q).unwrap(), now());
        }
        record
    }

    #[test]
    fn test_empty_learner() {
        let stats = aggregate(&[], now());

        assert_eq!(stats.total_items, 0);
        assert_eq!(stats.accuracy_rate, 0.0);
        assert!(!stats.accuracy_rate.is_nan());
        assert_eq!(stats.average_ease_factor, 0.0);
        assert!(stats.mastery_distribution.is_empty());
    }

    #[test]
    fn test_untouched_records_have_zero_accuracy() {
        let records = vec![ProgressRecord::new("u1", "a", now())];
        let stats = aggregate(&records, now());

        assert_eq!(stats.total_reviews, 0);
        assert_eq!(stats.accuracy_rate, 0.0);
        assert_eq!(stats.due_count, 1);
        assert_eq!(stats.average_ease_factor, 2.5);
    }

    #[test]
    fn test_aggregate_mixed_records() {
        let records = vec![
            reviewed("a", &[5, 5, 5, 5, 5]),
            reviewed("b", &[4, 1]),
            reviewed("c", &[2]),
        ];
        let stats = aggregate(&records, now());

        assert_eq!(stats.total_items, 3);
        assert_eq!(stats.total_reviews, 8);
        assert_eq!(stats.correct_reviews, 6);
        assert_eq!(stats.accuracy_rate, 75.0);
        assert_eq!(stats.mastered_items, 1);
        assert_eq!(stats.mastery_distribution.get(&MasteryLevel::Mastered), Some(&1));
        assert_eq!(stats.mastery_distribution.get(&MasteryLevel::New), Some(&2));
        // Nothing is due at the instant it was reviewed
        assert_eq!(stats.due_count, 0);
        assert_eq!(aggregate(&records, now() + Duration::days(1)).due_count, 2);

        let expected_ease = records.iter().map(|r| r.schedule.ease_factor).sum::<f64>() / 3.0;
        assert!((stats.average_ease_factor - expected_ease).abs() < 1e-9);
    }

    #[test]
    fn test_accuracy_rounded_to_two_decimals() {
        let records = vec![reviewed("a", &[5, 1, 1])];
        assert_eq!(aggregate(&records, now()).accuracy_rate, 33.33);
    }

    #[test]
    fn test_statistics_through_scheduler() {
        let store = MemoryStore::with_items([VocabularyItem {
            id: "a".to_string(),
            word: "acqua".to_string(),
            translation: "water".to_string(),
            part_of_speech: "noun".to_string(),
            example_sentence: String::new(),
            pronunciation: String::new(),
            language_code: "it".to_string(),
            difficulty_level: 1,
            frequency_rank: 1,
            tags: None,
            notes: None,
        }]);
        let scheduler = Scheduler::new(&store, &store, &store, &Config::default());
        scheduler.submit_review_at("u1", "a", 5, None, now()).unwrap();

        let stats = scheduler.statistics_at("u1", now()).unwrap();
        assert_eq!(stats.total_items, 1);
        assert_eq!(stats.accuracy_rate, 100.0);
        assert_eq!(scheduler.statistics_at("u2", now()).unwrap().total_items, 0);
    }

    #[test]
    fn test_distribution_serializes_with_numeric_keys() {
        let stats = aggregate(&[reviewed("a", &[4, 4, 4])], now());
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["mastery_distribution"]["4"], 1);
    }
}
