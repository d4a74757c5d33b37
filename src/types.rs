use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::services::{mastery, EngineError};

pub const MIN_EASE_FACTOR: f64 = 1.3;
pub const DEFAULT_EASE_FACTOR: f64 = 2.5;
pub const MIN_BOX_LEVEL: u8 = 1;
pub const MAX_BOX_LEVEL: u8 = 5;
/// Consecutive correct answers required at the top box before an item counts as mastered.
pub const MASTERY_STREAK: u32 = 3;
pub const MAX_QUALITY: u8 = 5;
/// Lowest quality that counts as a correct answer.
pub const PASSING_QUALITY: u8 = 3;

const MAX_ID_LEN: usize = 128;

// ========== Stage ==========

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    #[default]
    New,
    Learning,
    Reviewing,
    Mastered,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Self::New, Self::Learning, Self::Reviewing, Self::Mastered];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Learning => "LEARNING",
            Self::Reviewing => "REVIEWING",
            Self::Mastered => "MASTERED",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "NEW" => Ok(Self::New),
            "LEARNING" => Ok(Self::Learning),
            "REVIEWING" => Ok(Self::Reviewing),
            "MASTERED" => Ok(Self::Mastered),
            other => Err(EngineError::Validation(format!("unknown stage: {other}"))),
        }
    }
}

// ========== Graded response ==========

/// How the learner felt about an answer, reported alongside correctness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Confidence {
    Fast,
    Normal,
    Slow,
    Guessed,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Normal => "normal",
            Self::Slow => "slow",
            Self::Guessed => "guessed",
        }
    }
}

impl FromStr for Confidence {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "normal" => Ok(Self::Normal),
            "slow" => Ok(Self::Slow),
            "guessed" => Ok(Self::Guessed),
            other => Err(EngineError::Validation(format!("unknown confidence: {other}"))),
        }
    }
}

impl TryFrom<String> for Confidence {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// SM-2 response quality, 0 (blackout) through 5 (perfect recall).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "u8")]
pub struct Quality(u8);

impl Quality {
    pub fn new(value: i32) -> Result<Self, EngineError> {
        if (0..=MAX_QUALITY as i32).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(EngineError::Validation(format!(
                "quality must be within 0..={MAX_QUALITY}, got {value}"
            )))
        }
    }

    pub fn from_response(correct: bool, confidence: Confidence) -> Self {
        let q = match (correct, confidence) {
            (true, Confidence::Fast) => 5,
            (true, Confidence::Normal) => 4,
            (true, Confidence::Slow) | (true, Confidence::Guessed) => 3,
            (false, Confidence::Guessed) => 2,
            (false, _) => 0,
        };
        Self(q)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_passing(self) -> bool {
        self.0 >= PASSING_QUALITY
    }
}

impl From<Quality> for u8 {
    fn from(q: Quality) -> Self {
        q.0
    }
}

impl<'de> Deserialize<'de> for Quality {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = i32::deserialize(deserializer)?;
        Quality::new(raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResponse {
    pub correct: bool,
    pub confidence: Confidence,
}

impl ReviewResponse {
    pub fn new(correct: bool, confidence: Confidence) -> Self {
        Self { correct, confidence }
    }

    pub fn quality(&self) -> Quality {
        Quality::from_response(self.correct, self.confidence)
    }
}

// ========== LearningRecord ==========

/// Scheduling state of one item for one learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningRecord {
    pub learner_id: String,
    pub item_id: String,
    pub ease_factor: f64,
    pub interval_days: u32,
    pub repetition_count: u32,
    pub next_review_at: DateTime<Utc>,
    pub box_level: u8,
    pub stage: Stage,
    pub correct_streak: u32,
    pub longest_correct_streak: u32,
    pub total_reviews: u32,
    pub correct_reviews: u32,
    pub first_introduced_at: DateTime<Utc>,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    pub mastered_at: Option<DateTime<Utc>>,
    /// Number of persisted writes; zero means the record has never been stored.
    pub version: u64,
}

impl LearningRecord {
    pub fn new(learner_id: &str, item_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            learner_id: learner_id.to_string(),
            item_id: item_id.to_string(),
            ease_factor: DEFAULT_EASE_FACTOR,
            interval_days: 0,
            repetition_count: 0,
            next_review_at: now,
            box_level: MIN_BOX_LEVEL,
            stage: Stage::New,
            correct_streak: 0,
            longest_correct_streak: 0,
            total_reviews: 0,
            correct_reviews: 0,
            first_introduced_at: now,
            last_reviewed_at: None,
            mastered_at: None,
            version: 0,
        }
    }

    /// Same defaults as `new`, keeping the identity and the stored version so the
    /// write replaces the existing row.
    pub fn reset(&self, now: DateTime<Utc>) -> Self {
        Self {
            version: self.version,
            ..Self::new(&self.learner_id, &self.item_id, now)
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.version > 0
    }

    pub fn accuracy(&self) -> Option<f64> {
        if self.total_reviews == 0 {
            return None;
        }
        Some(self.correct_reviews as f64 / self.total_reviews as f64)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.stage != Stage::New && self.next_review_at <= now
    }

    /// Checks the record-level invariants; used before every write.
    pub fn check_invariants(&self) -> Result<(), EngineError> {
        let fail = |msg: &str| {
            Err(EngineError::Validation(format!(
                "record {}/{} violates invariant: {msg}",
                self.learner_id, self.item_id
            )))
        };
        if self.correct_reviews > self.total_reviews {
            return fail("correct_reviews > total_reviews");
        }
        if !(self.ease_factor >= MIN_EASE_FACTOR) {
            return fail("ease_factor below minimum");
        }
        if !(MIN_BOX_LEVEL..=MAX_BOX_LEVEL).contains(&self.box_level) {
            return fail("box_level out of range");
        }
        if let Some(last) = self.last_reviewed_at {
            if self.next_review_at < last {
                return fail("next_review_at before last_reviewed_at");
            }
        }
        if mastery::is_mastered(self) != mastery::meets_mastery_bar(self) {
            return fail("stage MASTERED must match top box with streak");
        }
        if mastery::is_mastered(self) != self.mastered_at.is_some() {
            return fail("mastered_at must be set exactly when MASTERED");
        }
        Ok(())
    }
}

pub fn validate_id(kind: &str, value: &str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::Validation(format!("{kind} must not be empty")));
    }
    if value.len() > MAX_ID_LEN {
        return Err(EngineError::Validation(format!(
            "{kind} exceeds maximum length of {MAX_ID_LEN}"
        )));
    }
    if value.chars().any(char::is_control) {
        return Err(EngineError::Validation(format!(
            "{kind} contains control characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_mapping_matches_grades() {
        assert_eq!(Quality::from_response(true, Confidence::Fast).value(), 5);
        assert_eq!(Quality::from_response(true, Confidence::Normal).value(), 4);
        assert_eq!(Quality::from_response(true, Confidence::Slow).value(), 3);
        assert_eq!(Quality::from_response(true, Confidence::Guessed).value(), 3);
        assert_eq!(Quality::from_response(false, Confidence::Guessed).value(), 2);
        assert_eq!(Quality::from_response(false, Confidence::Fast).value(), 0);
        assert_eq!(Quality::from_response(false, Confidence::Slow).value(), 0);
    }

    #[test]
    fn quality_out_of_range_is_rejected() {
        assert!(Quality::new(6).is_err());
        assert!(Quality::new(-1).is_err());
        assert!(Quality::new(0).is_ok());
        assert!(serde_json::from_str::<Quality>("7").is_err());
    }

    #[test]
    fn confidence_parses_case_insensitively() {
        assert_eq!("FAST".parse::<Confidence>().unwrap(), Confidence::Fast);
        assert!(matches!(
            "sure".parse::<Confidence>(),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn confidence_json_accepts_the_same_spellings_as_parse() {
        for raw in ["fast", "FAST", " Slow "] {
            let json = serde_json::to_string(raw).unwrap();
            let parsed: Confidence = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, raw.parse::<Confidence>().unwrap());
        }
        assert!(serde_json::from_str::<Confidence>("\"sure\"").is_err());
        assert_eq!(serde_json::to_string(&Confidence::Guessed).unwrap(), "\"guessed\"");

        let response: ReviewResponse =
            serde_json::from_str(r#"{"correct":true,"confidence":"Normal"}"#).unwrap();
        assert_eq!(response.quality().value(), 4);
    }

    #[test]
    fn mastered_stage_must_match_the_mastery_bar() {
        let now = Utc::now();
        let mut record = LearningRecord::new("u1", "w1", now);
        record.stage = Stage::Mastered;
        record.mastered_at = Some(now);
        record.box_level = MAX_BOX_LEVEL;
        record.correct_streak = MASTERY_STREAK - 1;
        assert!(record.check_invariants().is_err());

        record.correct_streak = MASTERY_STREAK;
        assert!(record.check_invariants().is_ok());

        record.stage = Stage::Reviewing;
        assert!(record.check_invariants().is_err());
    }

    #[test]
    fn stage_round_trips_through_str() {
        for stage in Stage::ALL {
            assert_eq!(stage.as_str().parse::<Stage>().unwrap(), stage);
        }
        assert!(Stage::New < Stage::Learning && Stage::Reviewing < Stage::Mastered);
    }

    #[test]
    fn new_record_satisfies_invariants() {
        let record = LearningRecord::new("u1", "w1", Utc::now());
        assert!(record.check_invariants().is_ok());
        assert_eq!(record.accuracy(), None);
        assert!(!record.is_persisted());
    }

    #[test]
    fn ids_are_validated() {
        assert!(validate_id("learnerId", "").is_err());
        assert!(validate_id("learnerId", "   ").is_err());
        assert!(validate_id("itemId", &"x".repeat(200)).is_err());
        assert!(validate_id("itemId", "word-42").is_ok());
    }
}
