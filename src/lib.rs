//! Spaced-repetition mastery engine for vocabulary items.
//!
//! Pure components (`services::review_outcome`, `services::mastery`,
//! `services::scheduler`, `services::struggling`) compute new scheduling state;
//! `services::LearningEngine` runs them against a `db::LearningStore`.

pub mod config;
pub mod db;
pub mod logging;
pub mod services;
pub mod types;

pub use config::{Config, EngineConfig};
pub use db::{ItemCatalog, LearningStore, MemoryStore, PersistenceError, RecordFilter, SqliteStore};
pub use services::{EngineError, EngineResult, LearningEngine, MasteryStats};
pub use types::{Confidence, LearningRecord, Quality, ReviewResponse, Stage};
