//! SM-2 ease/interval update combined with Leitner box promotion.
//!
//! The recorder is pure: it takes the current record by reference and returns
//! a complete replacement, so a caller that fails to persist the result never
//! leaves a half-applied review behind.

use chrono::{DateTime, Duration, Utc};

use crate::config::RecorderConfig;
use crate::services::mastery;
use crate::services::{EngineError, EngineResult};
use crate::types::{
    LearningRecord, Quality, ReviewResponse, Stage, MAX_BOX_LEVEL, MAX_QUALITY, MIN_BOX_LEVEL,
    MIN_EASE_FACTOR,
};

const FIRST_INTERVAL_DAYS: u32 = 1;
const SECOND_INTERVAL_DAYS: u32 = 6;
const LAPSE_INTERVAL_DAYS: u32 = 1;

#[derive(Debug, Clone, Default)]
pub struct ReviewOutcomeRecorder {
    config: RecorderConfig,
}

impl ReviewOutcomeRecorder {
    pub fn new(config: RecorderConfig) -> Self {
        Self { config }
    }

    /// Applies a graded response. `current = None` starts from a fresh NEW record;
    /// a record belonging to another learner or item is rejected.
    pub fn record(
        &self,
        current: Option<&LearningRecord>,
        learner_id: &str,
        item_id: &str,
        response: ReviewResponse,
        now: DateTime<Utc>,
    ) -> EngineResult<LearningRecord> {
        match current {
            Some(record) if record.learner_id != learner_id || record.item_id != item_id => {
                Err(EngineError::Validation(format!(
                    "record {}/{} does not belong to {learner_id}/{item_id}",
                    record.learner_id, record.item_id
                )))
            }
            Some(record) => self.apply(record, response.quality(), now),
            None => {
                let fresh = LearningRecord::new(learner_id, item_id, now);
                self.apply(&fresh, response.quality(), now)
            }
        }
    }

    pub fn apply(
        &self,
        current: &LearningRecord,
        quality: Quality,
        now: DateTime<Utc>,
    ) -> EngineResult<LearningRecord> {
        let mut next = current.clone();
        let correct = quality.is_passing();

        next.ease_factor = next_ease_factor(current.ease_factor, quality);

        if correct {
            next.repetition_count = current.repetition_count.saturating_add(1);
            next.interval_days = match next.repetition_count {
                1 => FIRST_INTERVAL_DAYS,
                2 => SECOND_INTERVAL_DAYS,
                _ => grow_interval(
                    current.interval_days,
                    next.ease_factor,
                    self.config.max_interval_days,
                ),
            };
            next.box_level = current.box_level.saturating_add(1).min(MAX_BOX_LEVEL);
            next.correct_streak = current.correct_streak.saturating_add(1);
            next.longest_correct_streak = current.longest_correct_streak.max(next.correct_streak);
            next.correct_reviews = current.correct_reviews.saturating_add(1);
        } else {
            next.repetition_count = 0;
            next.interval_days = LAPSE_INTERVAL_DAYS;
            next.box_level = current.box_level.saturating_sub(1).max(MIN_BOX_LEVEL);
            next.correct_streak = 0;
        }

        next.total_reviews = current.total_reviews.saturating_add(1);
        next.last_reviewed_at = Some(now);
        next.next_review_at = now
            .checked_add_signed(Duration::days(i64::from(next.interval_days)))
            .ok_or_else(|| {
                EngineError::Validation(format!("review timestamp out of range: {now}"))
            })?;

        next.stage = mastery::next_stage(current.stage, &next, correct);
        next.mastered_at = match (next.stage, current.mastered_at) {
            (Stage::Mastered, Some(at)) if current.stage == Stage::Mastered => Some(at),
            (Stage::Mastered, _) => Some(now),
            _ => None,
        };

        if current.stage != next.stage {
            tracing::debug!(
                learner_id = %next.learner_id,
                item_id = %next.item_id,
                from = %current.stage,
                to = %next.stage,
                quality = quality.value(),
                "stage transition"
            );
        }

        next.check_invariants()?;
        Ok(next)
    }
}

/// `EF' = max(1.3, EF + 0.1 - (5 - q) * (0.08 + (5 - q) * 0.02))`
pub fn next_ease_factor(ease_factor: f64, quality: Quality) -> f64 {
    let miss = f64::from(MAX_QUALITY - quality.value());
    let updated = ease_factor + (0.1 - miss * (0.08 + miss * 0.02));
    updated.max(MIN_EASE_FACTOR)
}

fn grow_interval(interval_days: u32, ease_factor: f64, max_interval_days: u32) -> u32 {
    let grown = (f64::from(interval_days) * ease_factor).round();
    if grown >= f64::from(max_interval_days) {
        max_interval_days
    } else {
        (grown as u32).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Confidence;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn fast() -> ReviewResponse {
        ReviewResponse::new(true, Confidence::Fast)
    }

    fn miss() -> ReviewResponse {
        ReviewResponse::new(false, Confidence::Normal)
    }

    #[test]
    fn ease_factor_follows_sm2() {
        let q = |v| Quality::new(v).unwrap();
        assert!((next_ease_factor(2.5, q(5)) - 2.6).abs() < 1e-9);
        assert!((next_ease_factor(2.5, q(4)) - 2.5).abs() < 1e-9);
        assert!((next_ease_factor(2.5, q(3)) - 2.36).abs() < 1e-9);
        assert!((next_ease_factor(2.5, q(0)) - 1.7).abs() < 1e-9);
        assert_eq!(next_ease_factor(1.3, q(0)), MIN_EASE_FACTOR);
    }

    #[test]
    fn first_review_leaves_new_stage() {
        let recorder = ReviewOutcomeRecorder::default();
        let record = recorder.record(None, "u1", "w1", fast(), t0()).unwrap();

        assert_eq!(record.stage, Stage::Learning);
        assert_eq!(record.repetition_count, 1);
        assert_eq!(record.interval_days, 1);
        assert_eq!(record.box_level, 2);
        assert_eq!(record.total_reviews, 1);
        assert_eq!(record.correct_reviews, 1);
        assert_eq!(record.next_review_at, t0() + Duration::days(1));
        assert_eq!(record.last_reviewed_at, Some(t0()));
    }

    #[test]
    fn intervals_grow_one_six_then_ease() {
        let recorder = ReviewOutcomeRecorder::default();
        let normal = ReviewResponse::new(true, Confidence::Normal);
        let r1 = recorder.record(None, "u1", "w1", normal, t0()).unwrap();
        let r2 = recorder.record(Some(&r1), "u1", "w1", normal, t0()).unwrap();
        let r3 = recorder.record(Some(&r2), "u1", "w1", normal, t0()).unwrap();

        assert_eq!(r1.interval_days, 1);
        assert_eq!(r2.interval_days, 6);
        assert_eq!(r2.stage, Stage::Reviewing);
        // quality 4 keeps ease at 2.5, so 6 * 2.5 = 15
        assert_eq!(r3.interval_days, 15);
    }

    #[test]
    fn incorrect_resets_repetitions_and_interval() {
        let recorder = ReviewOutcomeRecorder::default();
        let mut record = recorder.record(None, "u1", "w1", fast(), t0()).unwrap();
        for _ in 0..3 {
            record = recorder.record(Some(&record), "u1", "w1", fast(), t0()).unwrap();
        }
        let before_box = record.box_level;
        let lapsed = recorder.record(Some(&record), "u1", "w1", miss(), t0()).unwrap();

        assert_eq!(lapsed.repetition_count, 0);
        assert_eq!(lapsed.interval_days, 1);
        assert_eq!(lapsed.correct_streak, 0);
        assert_eq!(lapsed.box_level, before_box - 1);
        assert_eq!(lapsed.longest_correct_streak, 4);
        assert_eq!(lapsed.correct_reviews, 4);
        assert_eq!(lapsed.total_reviews, 5);
    }

    #[test]
    fn box_level_never_drops_below_one() {
        let recorder = ReviewOutcomeRecorder::default();
        let record = recorder.record(None, "u1", "w1", miss(), t0()).unwrap();
        assert_eq!(record.box_level, 1);
        assert_eq!(record.stage, Stage::Learning);
    }

    #[test]
    fn mastered_at_survives_further_correct_reviews() {
        let recorder = ReviewOutcomeRecorder::default();
        let mut record = recorder.record(None, "u1", "w1", fast(), t0()).unwrap();
        for _ in 0..3 {
            record = recorder.record(Some(&record), "u1", "w1", fast(), t0()).unwrap();
        }
        assert_eq!(record.stage, Stage::Mastered);
        let stamped = record.mastered_at;

        let later = t0() + Duration::days(40);
        let again = recorder.record(Some(&record), "u1", "w1", fast(), later).unwrap();
        assert_eq!(again.stage, Stage::Mastered);
        assert_eq!(again.mastered_at, stamped);
    }

    #[test]
    fn interval_is_capped() {
        let recorder = ReviewOutcomeRecorder::new(RecorderConfig {
            max_interval_days: 30,
        });
        let mut record = LearningRecord::new("u1", "w1", t0());
        record.stage = Stage::Reviewing;
        record.repetition_count = 5;
        record.interval_days = 25;
        record.box_level = 3;
        let next = recorder.record(Some(&record), "u1", "w1", fast(), t0()).unwrap();
        assert_eq!(next.interval_days, 30);
    }

    #[test]
    fn record_for_another_identity_is_rejected() {
        let recorder = ReviewOutcomeRecorder::default();
        let record = recorder.record(None, "u1", "w1", fast(), t0()).unwrap();

        let err = recorder
            .record(Some(&record), "u1", "w2", fast(), t0())
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(recorder.record(Some(&record), "u2", "w1", fast(), t0()).is_err());
    }
}
