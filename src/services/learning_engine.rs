use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::db::{ItemCatalog, LearningStore, PersistenceError, RecordFilter};
use crate::services::mastery::{self, MasteryAssessment};
use crate::services::review_outcome::ReviewOutcomeRecorder;
use crate::services::scheduler::{DueSummary, ReviewScheduler, ScheduledReview};
use crate::services::struggling::{StrugglingItem, StrugglingWordDetector};
use crate::services::{EngineError, EngineResult};
use crate::types::{validate_id, Confidence, LearningRecord, Quality, ReviewResponse, Stage};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryStats {
    pub total_introduced: usize,
    pub mastered_count: usize,
    /// Pooled `correct / total` over every review still on record.
    pub average_accuracy: f64,
    pub longest_streak: u32,
    pub new_count: usize,
    pub learning_count: usize,
    pub reviewing_count: usize,
    pub total_reviews: u64,
    pub correct_reviews: u64,
}

/// Entry point for callers. Owns no state beyond its collaborators; every
/// record lives in the store.
pub struct LearningEngine<S> {
    store: Arc<S>,
    catalog: Option<Arc<dyn ItemCatalog>>,
    recorder: ReviewOutcomeRecorder,
    scheduler: ReviewScheduler,
    detector: StrugglingWordDetector,
}

impl<S> Clone for LearningEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            catalog: self.catalog.clone(),
            recorder: self.recorder.clone(),
            scheduler: self.scheduler.clone(),
            detector: self.detector.clone(),
        }
    }
}

impl<S: LearningStore> LearningEngine<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            store,
            catalog: None,
            recorder: ReviewOutcomeRecorder::new(config.recorder),
            scheduler: ReviewScheduler::new(config.scheduler),
            detector: StrugglingWordDetector::new(config.struggling),
        }
    }

    /// Without a catalog every item id is accepted.
    pub fn with_catalog(mut self, catalog: Arc<dyn ItemCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn ensure_known_item(&self, item_id: &str) -> EngineResult<()> {
        match &self.catalog {
            Some(catalog) if !catalog.contains_item(item_id) => Err(EngineError::NotFound(
                format!("item {item_id} is not in the catalog"),
            )),
            _ => Ok(()),
        }
    }

    // ========== Writes ==========

    pub async fn record_review(
        &self,
        learner_id: &str,
        item_id: &str,
        correct: bool,
        confidence: Confidence,
        now: DateTime<Utc>,
    ) -> EngineResult<LearningRecord> {
        let response = ReviewResponse::new(correct, confidence);
        self.record_quality(learner_id, item_id, response.quality(), now)
            .await
    }

    /// Same as `record_review` for callers that grade on the raw 0..=5 scale.
    pub async fn record_graded(
        &self,
        learner_id: &str,
        item_id: &str,
        quality: i32,
        now: DateTime<Utc>,
    ) -> EngineResult<LearningRecord> {
        let quality = Quality::new(quality)?;
        self.record_quality(learner_id, item_id, quality, now).await
    }

    async fn record_quality(
        &self,
        learner_id: &str,
        item_id: &str,
        quality: Quality,
        now: DateTime<Utc>,
    ) -> EngineResult<LearningRecord> {
        validate_id("learnerId", learner_id)?;
        validate_id("itemId", item_id)?;
        self.ensure_known_item(item_id)?;

        let current = match self.store.get_record(learner_id, item_id).await? {
            Some(record) => record,
            None => LearningRecord::new(learner_id, item_id, now),
        };
        let next = self.recorder.apply(&current, quality, now)?;

        let stored = self.store.upsert_record(&next).await.map_err(|err| {
            if matches!(err, PersistenceError::Conflict { .. }) {
                tracing::warn!(learner_id, item_id, "review lost a concurrent update race");
            }
            err
        })?;

        tracing::debug!(
            learner_id,
            item_id,
            quality = quality.value(),
            stage = %stored.stage,
            box_level = stored.box_level,
            interval_days = stored.interval_days,
            "review recorded"
        );
        Ok(stored)
    }

    /// First exposure without a graded answer: NEW becomes LEARNING and is due
    /// immediately. Items already past NEW are returned unchanged.
    pub async fn introduce_item(
        &self,
        learner_id: &str,
        item_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<LearningRecord> {
        validate_id("learnerId", learner_id)?;
        validate_id("itemId", item_id)?;
        self.ensure_known_item(item_id)?;

        let mut record = match self.store.get_record(learner_id, item_id).await? {
            Some(existing) => existing,
            None => LearningRecord::new(learner_id, item_id, now),
        };
        let stage = mastery::introduce(record.stage);
        if stage == record.stage {
            return Ok(record);
        }
        record.stage = stage;
        record.first_introduced_at = now;
        record.next_review_at = now;
        record.check_invariants()?;

        let stored = self.store.upsert_record(&record).await?;
        tracing::debug!(learner_id, item_id, "item introduced");
        Ok(stored)
    }

    /// Returns the item to NEW defaults. An absent record is not an error: a
    /// fresh default is returned and nothing is written.
    pub async fn reset_progress(
        &self,
        learner_id: &str,
        item_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<LearningRecord> {
        validate_id("learnerId", learner_id)?;
        validate_id("itemId", item_id)?;

        let Some(existing) = self.store.get_record(learner_id, item_id).await? else {
            return Ok(LearningRecord::new(learner_id, item_id, now));
        };

        let stored = self.store.upsert_record(&existing.reset(now)).await?;
        tracing::info!(
            learner_id,
            item_id,
            previous_stage = %existing.stage,
            "learning progress reset"
        );
        Ok(stored)
    }

    /// Hard delete after the catalog item was removed.
    pub async fn forget_item(&self, learner_id: &str, item_id: &str) -> EngineResult<bool> {
        validate_id("learnerId", learner_id)?;
        validate_id("itemId", item_id)?;

        let removed = self.store.delete_record(learner_id, item_id).await?;
        if removed {
            tracing::info!(learner_id, item_id, "learning record deleted");
        }
        Ok(removed)
    }

    // ========== Reads ==========

    pub async fn get_due_reviews(
        &self,
        learner_id: &str,
        now: DateTime<Utc>,
        limit: Option<usize>,
    ) -> EngineResult<Vec<LearningRecord>> {
        let scheduled = self.get_scheduled_reviews(learner_id, now, limit).await?;
        Ok(scheduled.into_iter().map(|s| s.record).collect())
    }

    /// Due reviews with their overdue flags.
    pub async fn get_scheduled_reviews(
        &self,
        learner_id: &str,
        now: DateTime<Utc>,
        limit: Option<usize>,
    ) -> EngineResult<Vec<ScheduledReview>> {
        validate_id("learnerId", learner_id)?;
        let records = self
            .store
            .query_records(learner_id, &RecordFilter::due_by(now))
            .await?;
        Ok(self.scheduler.due_reviews(&records, now, limit))
    }

    pub async fn get_due_summary(
        &self,
        learner_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<DueSummary> {
        validate_id("learnerId", learner_id)?;
        let records = self.store.query_records(learner_id, &RecordFilter::all()).await?;
        Ok(self.scheduler.summary(&records, now))
    }

    pub async fn get_struggling(
        &self,
        learner_id: &str,
        limit: Option<usize>,
    ) -> EngineResult<Vec<StrugglingItem>> {
        validate_id("learnerId", learner_id)?;
        let filter = RecordFilter::min_reviews(self.detector.min_reviews());
        let records = self.store.query_records(learner_id, &filter).await?;
        Ok(self.detector.struggling(&records, limit))
    }

    /// Introduced items that were never graded.
    pub async fn get_unreviewed(&self, learner_id: &str) -> EngineResult<Vec<LearningRecord>> {
        validate_id("learnerId", learner_id)?;
        let filter = RecordFilter::all().with_stage(Stage::Learning);
        let records = self.store.query_records(learner_id, &filter).await?;
        Ok(self
            .detector
            .introduced_unreviewed(&records)
            .into_iter()
            .cloned()
            .collect())
    }

    pub async fn get_never_introduced(
        &self,
        learner_id: &str,
    ) -> EngineResult<Vec<LearningRecord>> {
        validate_id("learnerId", learner_id)?;
        let filter = RecordFilter::all().with_stage(Stage::New);
        let records = self.store.query_records(learner_id, &filter).await?;
        Ok(self
            .detector
            .never_introduced(&records)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Struggling items take up to half of the queue, due items fill the rest,
    /// and leftover struggling items backfill if too few are due.
    pub async fn get_practice_queue(
        &self,
        learner_id: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> EngineResult<Vec<LearningRecord>> {
        validate_id("learnerId", learner_id)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let records = self.store.query_records(learner_id, &RecordFilter::all()).await?;
        let struggling = self.detector.struggling(&records, None);
        let due = self.scheduler.due_reviews(&records, now, None);
        let struggling_quota = limit / 2;

        let mut seen: HashSet<String> = HashSet::new();
        let mut queue: Vec<LearningRecord> = Vec::with_capacity(limit);

        let prioritized = struggling.iter().take(struggling_quota).map(|s| &s.record);
        let due_records = due.iter().map(|d| &d.record);
        let backfill = struggling.iter().skip(struggling_quota).map(|s| &s.record);

        for record in prioritized.chain(due_records).chain(backfill) {
            if queue.len() >= limit {
                break;
            }
            if seen.insert(record.item_id.clone()) {
                queue.push(record.clone());
            }
        }

        Ok(queue)
    }

    pub async fn get_mastery_stats(&self, learner_id: &str) -> EngineResult<MasteryStats> {
        validate_id("learnerId", learner_id)?;
        let records = self.store.query_records(learner_id, &RecordFilter::all()).await?;
        Ok(aggregate_stats(&records))
    }

    pub async fn get_assessment(
        &self,
        learner_id: &str,
        item_id: &str,
    ) -> EngineResult<Option<MasteryAssessment>> {
        validate_id("learnerId", learner_id)?;
        validate_id("itemId", item_id)?;
        let record = self.store.get_record(learner_id, item_id).await?;
        Ok(record.as_ref().map(mastery::classify))
    }
}

pub fn aggregate_stats(records: &[LearningRecord]) -> MasteryStats {
    let mut stats = MasteryStats::default();

    for record in records {
        match record.stage {
            Stage::New => stats.new_count += 1,
            Stage::Learning => stats.learning_count += 1,
            Stage::Reviewing => stats.reviewing_count += 1,
            Stage::Mastered => stats.mastered_count += 1,
        }
        stats.total_reviews += u64::from(record.total_reviews);
        stats.correct_reviews += u64::from(record.correct_reviews);
        stats.longest_streak = stats.longest_streak.max(record.longest_correct_streak);
    }

    stats.total_introduced = records.len() - stats.new_count;
    if stats.total_reviews > 0 {
        stats.average_accuracy = stats.correct_reviews as f64 / stats.total_reviews as f64;
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn stats_pool_reviews_across_items() {
        let now = Utc::now();
        let mut a = LearningRecord::new("u1", "a", now);
        a.stage = Stage::Reviewing;
        a.total_reviews = 4;
        a.correct_reviews = 3;
        a.longest_correct_streak = 3;
        let mut b = LearningRecord::new("u1", "b", now);
        b.stage = Stage::Learning;
        b.total_reviews = 6;
        b.correct_reviews = 1;
        b.longest_correct_streak = 1;
        let c = LearningRecord::new("u1", "c", now - Duration::days(1));

        let stats = aggregate_stats(&[a, b, c]);
        assert_eq!(stats.total_introduced, 2);
        assert_eq!(stats.new_count, 1);
        assert_eq!(stats.mastered_count, 0);
        assert_eq!(stats.longest_streak, 3);
        assert!((stats.average_accuracy - 0.4).abs() < 1e-9);
    }

    #[test]
    fn empty_stats_are_zero() {
        let stats = aggregate_stats(&[]);
        assert_eq!(stats, MasteryStats::default());
    }
}
