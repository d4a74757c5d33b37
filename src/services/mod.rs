pub mod learning_engine;
pub mod mastery;
pub mod review_outcome;
pub mod scheduler;
pub mod struggling;

use thiserror::Error;

use crate::db::PersistenceError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

pub type EngineResult<T> = Result<T, EngineError>;

pub use learning_engine::{LearningEngine, MasteryStats};
pub use mastery::MasteryAssessment;
pub use review_outcome::ReviewOutcomeRecorder;
pub use scheduler::{DueSummary, ReviewScheduler, ScheduledReview};
pub use struggling::{StrugglingItem, StrugglingWordDetector};
