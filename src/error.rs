//! Error types for the scheduling engine
//!
//! Every failure that leaves the engine is one of these kinds, so callers
//! can tell a bad request apart from a store outage or a write conflict.

use std::sync::OnceLock;

use regex::Regex;

/// Longest identifier accepted for learners and items
pub const MAX_ID_LEN: usize = 64;

/// Rejected input, detected before any store call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("quality must be between 0 and 5, got {0}")]
    QualityOutOfRange(i64),

    #[error("{field} must not be empty")]
    EmptyId { field: &'static str },

    #[error("{field} is malformed: '{value}' (allowed: A-Z a-z 0-9 - _ . up to {} chars)", MAX_ID_LEN)]
    MalformedId { field: &'static str, value: String },
}

/// Failure reported by a progress store, item catalog or learner directory
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The record changed between read and write
    #[error("progress record {record_id} was modified concurrently")]
    Conflict { record_id: String },

    #[error("storage backend error: {0}")]
    Backend(#[from] rusqlite::Error),

    #[error("stored value is corrupt: {0}")]
    Corrupt(String),

    #[error("store lock poisoned")]
    Poisoned,
}

impl StoreError {
    /// Whether the caller may retry the whole operation
    pub fn is_retryable(&self) -> bool {
        !matches!(self, StoreError::Corrupt(_))
    }
}

/// Error surfaced by the scheduling engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("item {0} is not in the catalog")]
    ItemNotFound(String),

    #[error("review for learner {learner_id}, item {item_id} conflicted again after retry")]
    Conflict { learner_id: String, item_id: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Store failures and persistent conflicts may succeed on a later attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Store(e) => e.is_retryable(),
            EngineError::Conflict { .. } => true,
            EngineError::Validation(_) | EngineError::ItemNotFound(_) => false,
        }
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("static regex"))
}

/// Check a learner or item identifier
pub fn validate_id(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::EmptyId { field });
    }
    if value.len() > MAX_ID_LEN || !id_pattern().is_match(value) {
        return Err(ValidationError::MalformedId {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}
