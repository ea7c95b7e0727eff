//! SM-2 Spaced Repetition Algorithm
//!
//! Adaptation of SuperMemo 2 used to grow the gap between reviews of a
//! vocabulary item as the learner keeps recalling it.
//!
//! Quality ratings (0-5):
//! - 0: Complete blackout, no recall
//! - 1: Incorrect, but upon seeing answer, remembered
//! - 2: Incorrect, but answer seemed easy to recall
//! - 3: Correct response with serious difficulty
//! - 4: Correct response after hesitation
//! - 5: Perfect response with no hesitation

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Minimum ease factor allowed
pub const MIN_EASE_FACTOR: f64 = 1.3;

/// Ease factor of an item that has never been reviewed
pub const INITIAL_EASE_FACTOR: f64 = 2.5;

/// Longest gap between two reviews, about a century
pub const MAX_INTERVAL_DAYS: u32 = 36_500;

/// Lowest quality counted as a correct recall
const CORRECT_THRESHOLD: u8 = 3;

/// Recall quality on the 0-5 scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Quality(u8);

impl Quality {
    pub const MAX: u8 = 5;

    pub fn new(value: i64) -> Result<Self, ValidationError> {
        if (0..=Self::MAX as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(ValidationError::QualityOutOfRange(value))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_correct(self) -> bool {
        self.0 >= CORRECT_THRESHOLD
    }

    /// All valid ratings, lowest first
    pub fn all() -> impl Iterator<Item = Quality> {
        (0..=Self::MAX).map(Quality)
    }
}

/// How reliably a learner recalls an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum MasteryLevel {
    New = 1,
    Beginner = 2,
    Intermediate = 3,
    Advanced = 4,
    Mastered = 5,
}

impl MasteryLevel {
    /// Tier reached after a review with `quality` that left `repetitions`
    pub fn classify(repetitions: u32, quality: Quality) -> Self {
        let q = quality.value();
        if repetitions >= 5 && q >= 4 {
            MasteryLevel::Mastered
        } else if repetitions >= 3 && q >= 3 {
            MasteryLevel::Advanced
        } else if repetitions >= 2 && q >= 3 {
            MasteryLevel::Intermediate
        } else if repetitions >= 1 && q >= 2 {
            MasteryLevel::Beginner
        } else {
            MasteryLevel::New
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MasteryLevel::New => "new",
            MasteryLevel::Beginner => "beginner",
            MasteryLevel::Intermediate => "intermediate",
            MasteryLevel::Advanced => "advanced",
            MasteryLevel::Mastered => "mastered",
        }
    }
}

impl From<MasteryLevel> for u8 {
    fn from(level: MasteryLevel) -> Self {
        level as u8
    }
}

impl TryFrom<u8> for MasteryLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MasteryLevel::New),
            2 => Ok(MasteryLevel::Beginner),
            3 => Ok(MasteryLevel::Intermediate),
            4 => Ok(MasteryLevel::Advanced),
            5 => Ok(MasteryLevel::Mastered),
            other => Err(format!("invalid mastery level {}", other)),
        }
    }
}

/// Scheduling state of one learner/item pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub ease_factor: f64,
    /// Days until the next review; 0 before the first review
    pub interval: u32,
    /// Consecutive correct recalls
    pub repetitions: u32,
    pub next_review_at: DateTime<Utc>,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    pub total_reviews: u32,
    pub correct_reviews: u32,
    pub mastery_level: MasteryLevel,
}

impl Schedule {
    /// State of an item the learner has never reviewed, due immediately
    pub fn initial(now: DateTime<Utc>) -> Self {
        Self {
            ease_factor: INITIAL_EASE_FACTOR,
            interval: 0,
            repetitions: 0,
            next_review_at: now,
            last_reviewed_at: None,
            total_reviews: 0,
            correct_reviews: 0,
            mastery_level: MasteryLevel::New,
        }
    }

    pub fn is_mastered(&self) -> bool {
        self.mastery_level == MasteryLevel::Mastered
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review_at <= now
    }
}

/// Apply one graded review to `state`
///
/// Pure: the only time input is `now`, and `next_review_at` of the result is
/// exactly `now + interval` days.
pub fn advance(state: &Schedule, quality: Quality, now: DateTime<Utc>) -> Schedule {
    let q = quality.value() as f64;

    // EF' = EF + (0.1 - (5-q) * (0.08 + (5-q) * 0.02))
    let ease_factor = (state.ease_factor + (0.1 - (5.0 - q) * (0.08 + (5.0 - q) * 0.02)))
        .max(MIN_EASE_FACTOR);

    let (repetitions, interval) = if quality.is_correct() {
        let repetitions = state.repetitions + 1;
        let interval = match repetitions {
            1 => 1,
            2 => 6,
            _ => ((state.interval as f64 * ease_factor).round() as u32)
                .clamp(1, MAX_INTERVAL_DAYS),
        };
        (repetitions, interval)
    } else {
        // Restart the ladder regardless of ease
        (0, 1)
    };

    Schedule {
        ease_factor,
        interval,
        repetitions,
        next_review_at: due_after(now, interval),
        last_reviewed_at: Some(now),
        total_reviews: state.total_reviews + 1,
        correct_reviews: state.correct_reviews + u32::from(quality.is_correct()),
        mastery_level: MasteryLevel::classify(repetitions, quality),
    }
}

/// Latest review date that still stores as a four-digit year
pub fn latest_review_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `now + interval` days, pinned to [`latest_review_at`]
fn due_after(now: DateTime<Utc>, interval: u32) -> DateTime<Utc> {
    let latest = latest_review_at();
    now.checked_add_signed(Duration::days(interval as i64))
        .filter(|due| *due <= latest)
        .unwrap_or(latest)
}

/// Interval each rating 0-5 would produce, indexed by quality
pub fn preview_intervals(state: &Schedule, now: DateTime<Utc>) -> [u32; 6] {
    let mut intervals = [0; 6];
    for quality in Quality::all() {
        intervals[quality.value() as usize] = advance(state, quality, now).interval;
    }
    intervals
}

/// Format an interval in days to a human-readable string
pub fn format_interval(days: u32) -> String {
    match days {
        0 => "now".to_string(),
        1..=6 => format!("{}d", days),
        7..=29 => format!("{}w", days / 7),
        30..=364 => format!("{}mo", days / 30),
        _ => format!("{}y", days / 365),
    }
}
