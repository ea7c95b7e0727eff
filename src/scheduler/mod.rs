//! Scheduling engine
//!
//! `Scheduler` composes review sessions, grades reviews with SM-2 and
//! aggregates learner statistics. It holds no mutable state of its own:
//! everything lives behind the storage capabilities it is given, so one
//! instance can serve concurrent requests.

use tracing::debug;

use crate::config::Config;
use crate::error::StoreError;
use crate::storage::{ItemCatalog, LearnerDirectory, ProgressStore};

pub mod session;
pub mod sm2;
pub mod stats;

pub use session::{ReviewOutcome, SessionItem};
pub use sm2::{advance, MasteryLevel, Quality, Schedule};
pub use stats::LearnerStatistics;

pub struct Scheduler<'a> {
    progress: &'a dyn ProgressStore,
    catalog: &'a dyn ItemCatalog,
    learners: &'a dyn LearnerDirectory,
    default_language: String,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        progress: &'a dyn ProgressStore,
        catalog: &'a dyn ItemCatalog,
        learners: &'a dyn LearnerDirectory,
        config: &Config,
    ) -> Self {
        Self {
            progress,
            catalog,
            learners,
            default_language: config.learner.default_language.clone(),
        }
    }

    /// Language new items are drawn from for this learner
    pub fn target_language(&self, learner_id: &str) -> Result<String, StoreError> {
        match self.learners.target_language(learner_id)? {
            Some(language) => Ok(language),
            None => {
                debug!(
                    "Learner {} has no target language, using {}",
                    learner_id, self.default_language
                );
                Ok(self.default_language.clone())
            }
        }
    }
}
