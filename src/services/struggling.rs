use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::config::StrugglingConfig;
use crate::types::{LearningRecord, Stage};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrugglingItem {
    pub record: LearningRecord,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Default)]
pub struct StrugglingWordDetector {
    config: StrugglingConfig,
}

impl StrugglingWordDetector {
    pub fn new(config: StrugglingConfig) -> Self {
        Self { config }
    }

    pub fn min_reviews(&self) -> u32 {
        self.config.min_reviews.max(1)
    }

    /// Lowest accuracy first; among equal accuracy the item with more attempts
    /// is the more certain struggle.
    pub fn struggling(&self, records: &[LearningRecord], limit: Option<usize>) -> Vec<StrugglingItem> {
        let min_reviews = self.min_reviews();
        let mut items: Vec<StrugglingItem> = records
            .iter()
            .filter(|r| r.total_reviews >= min_reviews)
            .filter_map(|r| {
                let accuracy = r.accuracy()?;
                (accuracy < self.config.threshold).then(|| StrugglingItem {
                    record: r.clone(),
                    accuracy,
                })
            })
            .collect();

        items.sort_by(struggling_order);
        items.truncate(limit.unwrap_or(usize::MAX));
        items
    }

    /// Shown to the learner but never graded.
    pub fn introduced_unreviewed<'a>(&self, records: &'a [LearningRecord]) -> Vec<&'a LearningRecord> {
        records
            .iter()
            .filter(|r| r.stage == Stage::Learning && r.total_reviews == 0)
            .collect()
    }

    pub fn never_introduced<'a>(&self, records: &'a [LearningRecord]) -> Vec<&'a LearningRecord> {
        records.iter().filter(|r| r.stage == Stage::New).collect()
    }
}

fn struggling_order(a: &StrugglingItem, b: &StrugglingItem) -> Ordering {
    a.accuracy
        .partial_cmp(&b.accuracy)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.record.total_reviews.cmp(&a.record.total_reviews))
        .then_with(|| a.record.item_id.cmp(&b.record.item_id))
}
