#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use vocab_mastery::config::EngineConfig;
use vocab_mastery::db::MemoryStore;
use vocab_mastery::services::LearningEngine;
use vocab_mastery::types::{Confidence, LearningRecord, Stage};

pub const LEARNER: &str = "learner-1";

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 8, 30, 0).unwrap()
}

pub fn days(n: i64) -> Duration {
    Duration::days(n)
}

pub fn memory_engine() -> LearningEngine<MemoryStore> {
    LearningEngine::new(Arc::new(MemoryStore::new()), EngineConfig::default())
}

/// Reviews `item` `times` times in a row, each answer one interval after the
/// previous so the item is always due.
pub async fn review_n(
    engine: &LearningEngine<MemoryStore>,
    item: &str,
    correct: bool,
    confidence: Confidence,
    times: usize,
    start: DateTime<Utc>,
) -> LearningRecord {
    let mut at = start;
    let mut last = None;
    for _ in 0..times {
        let record = engine
            .record_review(LEARNER, item, correct, confidence, at)
            .await
            .expect("review should succeed");
        at = record.next_review_at;
        last = Some(record);
    }
    last.expect("at least one review")
}

/// Builds a history of `correct` right answers out of `total`, wrong ones first.
pub async fn seed_accuracy(
    engine: &LearningEngine<MemoryStore>,
    item: &str,
    correct: usize,
    total: usize,
    start: DateTime<Utc>,
) -> LearningRecord {
    let mut record = None;
    let mut at = start;
    for i in 0..total {
        let ok = i >= total - correct;
        let r = engine
            .record_review(LEARNER, item, ok, Confidence::Normal, at)
            .await
            .expect("review should succeed");
        at += days(1);
        record = Some(r);
    }
    record.expect("at least one review")
}

pub fn assert_invariants(record: &LearningRecord) {
    assert!(record.correct_reviews <= record.total_reviews);
    assert!(record.ease_factor >= 1.3);
    assert!((1..=5).contains(&record.box_level));
    if let Some(last) = record.last_reviewed_at {
        assert!(record.next_review_at >= last);
    }
    let top = record.box_level == 5 && record.correct_streak >= 3;
    assert_eq!(record.stage == Stage::Mastered, top);
    assert_eq!(record.stage == Stage::Mastered, record.mastered_at.is_some());
}
