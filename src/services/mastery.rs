//! Mastery semantics: stage transitions, struggling score and the
//! display-only mastery level. Nothing else in the crate derives a stage.

use serde::{Deserialize, Serialize};

use crate::types::{LearningRecord, Stage, MASTERY_STREAK, MAX_BOX_LEVEL, MIN_BOX_LEVEL};

/// Reviews required before a struggling score is meaningful.
pub const MIN_REVIEWS_FOR_SCORE: u32 = 3;
/// Correct repetitions in a row that move an item from LEARNING to REVIEWING.
pub const REVIEWING_REPETITIONS: u32 = 2;

const BOX_WEIGHT: f64 = 0.7;
const ACCURACY_WEIGHT: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryAssessment {
    pub item_id: String,
    pub stage: Stage,
    /// `None` until the item has enough reviews.
    pub struggling_score: Option<f64>,
    pub mastery_level: f64,
}

pub fn classify(record: &LearningRecord) -> MasteryAssessment {
    MasteryAssessment {
        item_id: record.item_id.clone(),
        stage: record.stage,
        struggling_score: struggling_score(record),
        mastery_level: mastery_level(record),
    }
}

pub fn struggling_score(record: &LearningRecord) -> Option<f64> {
    if record.total_reviews < MIN_REVIEWS_FOR_SCORE {
        return None;
    }
    record.accuracy().map(|acc| 1.0 - acc)
}

pub fn is_mastered(record: &LearningRecord) -> bool {
    record.stage == Stage::Mastered
}

/// Whether the scheduling fields alone qualify the item for MASTERED.
pub fn meets_mastery_bar(record: &LearningRecord) -> bool {
    record.box_level == MAX_BOX_LEVEL && record.correct_streak >= MASTERY_STREAK
}

/// Stage after first exposure without a graded answer. Only NEW moves; every
/// later stage is kept.
pub fn introduce(current: Stage) -> Stage {
    match current {
        Stage::New => Stage::Learning,
        other => other,
    }
}

/// Stage after a graded review. `updated` already carries the new box level,
/// streak and repetition count.
pub fn next_stage(current: Stage, updated: &LearningRecord, correct: bool) -> Stage {
    if correct && meets_mastery_bar(updated) {
        return Stage::Mastered;
    }

    match current {
        Stage::Mastered => Stage::Reviewing,
        Stage::Reviewing => Stage::Reviewing,
        Stage::New | Stage::Learning => {
            if updated.repetition_count >= REVIEWING_REPETITIONS {
                Stage::Reviewing
            } else {
                Stage::Learning
            }
        }
    }
}

/// Continuous 0..=1 projection of box level and accuracy, for display only.
/// It is recomputed on demand and never stored.
pub fn mastery_level(record: &LearningRecord) -> f64 {
    match record.stage {
        Stage::New => 0.0,
        Stage::Mastered => 1.0,
        Stage::Learning | Stage::Reviewing => {
            let span = f64::from(MAX_BOX_LEVEL - MIN_BOX_LEVEL);
            let box_part = f64::from(record.box_level.saturating_sub(MIN_BOX_LEVEL)) / span;
            let accuracy = record.accuracy().unwrap_or(0.0);
            (box_part * BOX_WEIGHT + accuracy * ACCURACY_WEIGHT).clamp(0.0, 1.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record_with(box_level: u8, streak: u32, reps: u32) -> LearningRecord {
        let mut record = LearningRecord::new("u1", "w1", Utc::now());
        record.box_level = box_level;
        record.correct_streak = streak;
        record.repetition_count = reps;
        record
    }

    #[test]
    fn struggling_score_requires_three_reviews() {
        let mut record = record_with(1, 0, 0);
        record.total_reviews = 2;
        record.correct_reviews = 0;
        assert_eq!(struggling_score(&record), None);

        record.total_reviews = 4;
        record.correct_reviews = 1;
        let score = struggling_score(&record).unwrap();
        assert!((score - 0.75).abs() < 1e-9);
    }

    #[test]
    fn transition_table() {
        let first_pass = record_with(2, 1, 1);
        assert_eq!(next_stage(Stage::New, &first_pass, true), Stage::Learning);
        assert_eq!(next_stage(Stage::New, &record_with(1, 0, 0), false), Stage::Learning);

        let second_pass = record_with(3, 2, 2);
        assert_eq!(next_stage(Stage::Learning, &second_pass, true), Stage::Reviewing);

        // A lapse after reaching REVIEWING does not fall back to LEARNING.
        let lapsed = record_with(2, 0, 0);
        assert_eq!(next_stage(Stage::Reviewing, &lapsed, false), Stage::Reviewing);

        let top = record_with(5, 3, 5);
        assert_eq!(next_stage(Stage::Reviewing, &top, true), Stage::Mastered);

        let demoted = record_with(4, 0, 0);
        assert_eq!(next_stage(Stage::Mastered, &demoted, false), Stage::Reviewing);
    }

    #[test]
    fn introduction_only_moves_new_items() {
        assert_eq!(introduce(Stage::New), Stage::Learning);
        for stage in [Stage::Learning, Stage::Reviewing, Stage::Mastered] {
            assert_eq!(introduce(stage), stage);
        }
    }

    #[test]
    fn top_box_without_streak_is_not_mastered() {
        let lucky = record_with(5, 1, 1);
        assert_eq!(next_stage(Stage::Reviewing, &lucky, true), Stage::Reviewing);
    }

    #[test]
    fn mastery_level_is_bounded() {
        let mut record = record_with(1, 0, 0);
        assert_eq!(mastery_level(&record), 0.0);

        record.stage = Stage::Reviewing;
        record.box_level = 3;
        record.total_reviews = 4;
        record.correct_reviews = 4;
        let level = mastery_level(&record);
        assert!((level - 0.65).abs() < 1e-9);

        record.stage = Stage::Mastered;
        assert_eq!(mastery_level(&record), 1.0);
    }
}
