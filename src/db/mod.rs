//! Persistence collaborators for the mastery engine.
//!
//! Stores hold one `LearningRecord` per (learner, item). Writes are
//! version-checked: `upsert_record` succeeds only when the stored version still
//! equals `record.version`, which makes the engine's read-modify-write atomic
//! without holding a lock across the computation.

pub mod memory;
pub mod sqlite;

use std::collections::HashSet;
use std::future::Future;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{LearningRecord, Stage};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("concurrent update of {learner_id}/{item_id}")]
    Conflict { learner_id: String, item_id: String },
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, PersistenceError>;

/// Predicate pushed down to the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    /// Introduced items whose `next_review_at` is at or before this instant.
    pub due_by: Option<DateTime<Utc>>,
    pub min_reviews: Option<u32>,
    pub stage: Option<Stage>,
}

impl RecordFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn due_by(now: DateTime<Utc>) -> Self {
        Self {
            due_by: Some(now),
            ..Self::default()
        }
    }

    pub fn min_reviews(min: u32) -> Self {
        Self {
            min_reviews: Some(min),
            ..Self::default()
        }
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn matches(&self, record: &LearningRecord) -> bool {
        if let Some(now) = self.due_by {
            if !record.is_due(now) {
                return false;
            }
        }
        if let Some(min) = self.min_reviews {
            if record.total_reviews < min {
                return false;
            }
        }
        if let Some(stage) = self.stage {
            if record.stage != stage {
                return false;
            }
        }
        true
    }
}

pub trait LearningStore: Send + Sync {
    fn get_record(
        &self,
        learner_id: &str,
        item_id: &str,
    ) -> impl Future<Output = StoreResult<Option<LearningRecord>>> + Send;

    /// Writes the whole record if the stored version equals `record.version`
    /// (zero meaning "must not exist yet"). Returns the record as stored, with
    /// its version incremented; a mismatch is `PersistenceError::Conflict`.
    fn upsert_record(
        &self,
        record: &LearningRecord,
    ) -> impl Future<Output = StoreResult<LearningRecord>> + Send;

    fn query_records(
        &self,
        learner_id: &str,
        filter: &RecordFilter,
    ) -> impl Future<Output = StoreResult<Vec<LearningRecord>>> + Send;

    /// Hard delete, used only when the catalog drops the item.
    fn delete_record(
        &self,
        learner_id: &str,
        item_id: &str,
    ) -> impl Future<Output = StoreResult<bool>> + Send;
}

/// Lookup into the vocabulary catalog; the engine only needs membership.
pub trait ItemCatalog: Send + Sync {
    fn contains_item(&self, item_id: &str) -> bool;
}

impl ItemCatalog for HashSet<String> {
    fn contains_item(&self, item_id: &str) -> bool {
        self.contains(item_id)
    }
}
