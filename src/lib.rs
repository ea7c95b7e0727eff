//! lexis - spaced-repetition scheduling for vocabulary learning
//!
//! The engine decides which items a learner should see next and updates
//! each item's schedule from a 0-5 recall quality using an SM-2 variant.
//! Persistence is abstracted behind the traits in [`storage`].

pub mod config;
pub mod error;
pub mod scheduler;
pub mod storage;

pub use config::Config;
pub use error::{EngineError, StoreError, ValidationError};
pub use scheduler::{LearnerStatistics, MasteryLevel, Quality, ReviewOutcome, Scheduler, SessionItem};
pub use storage::{ItemCatalog, LearnerDirectory, ProgressRecord, ProgressStore, VocabularyItem};
