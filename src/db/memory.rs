use std::collections::HashMap;

use parking_lot::RwLock;

use crate::db::{LearningStore, PersistenceError, RecordFilter, StoreResult};
use crate::types::LearningRecord;

type RecordKey = (String, String);

/// In-process store. The write lock is held only for the compare-and-swap,
/// never across an `.await`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<RecordKey, LearningRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

fn key(learner_id: &str, item_id: &str) -> RecordKey {
    (learner_id.to_string(), item_id.to_string())
}

impl LearningStore for MemoryStore {
    async fn get_record(
        &self,
        learner_id: &str,
        item_id: &str,
    ) -> StoreResult<Option<LearningRecord>> {
        Ok(self.records.read().get(&key(learner_id, item_id)).cloned())
    }

    async fn upsert_record(&self, record: &LearningRecord) -> StoreResult<LearningRecord> {
        let mut records = self.records.write();
        let key = key(&record.learner_id, &record.item_id);

        let stored_version = records.get(&key).map(|r| r.version).unwrap_or(0);
        if stored_version != record.version {
            return Err(PersistenceError::Conflict {
                learner_id: record.learner_id.clone(),
                item_id: record.item_id.clone(),
            });
        }

        let mut stored = record.clone();
        stored.version = record.version + 1;
        records.insert(key, stored.clone());
        Ok(stored)
    }

    async fn query_records(
        &self,
        learner_id: &str,
        filter: &RecordFilter,
    ) -> StoreResult<Vec<LearningRecord>> {
        let records = self.records.read();
        let mut out: Vec<LearningRecord> = records
            .values()
            .filter(|r| r.learner_id == learner_id && filter.matches(r))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.item_id.cmp(&b.item_id));
        Ok(out)
    }

    async fn delete_record(&self, learner_id: &str, item_id: &str) -> StoreResult<bool> {
        Ok(self.records.write().remove(&key(learner_id, item_id)).is_some())
    }
}
