use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SchedulerConfig;
use crate::types::{LearningRecord, Stage};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledReview {
    pub record: LearningRecord,
    pub overdue_days: i64,
    pub severely_overdue: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DueSummary {
    pub due_now: usize,
    pub severely_overdue: usize,
    /// Earliest upcoming review among items that are not due yet.
    pub next_due_at: Option<DateTime<Utc>>,
}

/// Selects introduced items whose review time has passed. Elapsed time is
/// only reported, never folded back into box level or stage.
#[derive(Debug, Clone, Default)]
pub struct ReviewScheduler {
    config: SchedulerConfig,
}

impl ReviewScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    fn grace(&self) -> Duration {
        Duration::days(self.config.severe_overdue_days.max(0))
    }

    pub fn due_reviews(
        &self,
        records: &[LearningRecord],
        now: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Vec<ScheduledReview> {
        let mut due: Vec<&LearningRecord> = records.iter().filter(|r| r.is_due(now)).collect();
        due.sort_by(|a, b| review_order(a, b));

        let grace = self.grace();
        due.into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(|record| {
                let overdue = now - record.next_review_at;
                ScheduledReview {
                    overdue_days: overdue.num_days(),
                    severely_overdue: overdue > grace,
                    record: record.clone(),
                }
            })
            .collect()
    }

    pub fn summary(&self, records: &[LearningRecord], now: DateTime<Utc>) -> DueSummary {
        let grace = self.grace();
        let mut summary = DueSummary::default();

        for record in records {
            if record.is_due(now) {
                summary.due_now += 1;
                if now - record.next_review_at > grace {
                    summary.severely_overdue += 1;
                }
            } else if record.stage != Stage::New {
                summary.next_due_at = Some(match summary.next_due_at {
                    Some(at) => at.min(record.next_review_at),
                    None => record.next_review_at,
                });
            }
        }

        summary
    }
}

/// Most overdue first, weaker box first among equals, then item id.
fn review_order(a: &LearningRecord, b: &LearningRecord) -> Ordering {
    a.next_review_at
        .cmp(&b.next_review_at)
        .then_with(|| a.box_level.cmp(&b.box_level))
        .then_with(|| a.item_id.cmp(&b.item_id))
}
