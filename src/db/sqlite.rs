use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::db::{LearningStore, PersistenceError, RecordFilter, StoreResult};
use crate::types::{LearningRecord, Stage};

const SQLITE_SCHEMA: &str = include_str!("../../sql/sqlite_schema.sql");

const SELECT_COLUMNS: &str = r#"
    "learner_id","item_id","ease_factor","interval_days","repetition_count","next_review_at",
    "box_level","stage","correct_streak","longest_correct_streak","total_reviews",
    "correct_reviews","first_introduced_at","last_reviewed_at","mastered_at","version"
"#;

/// Durable store on SQLite. Timestamps are persisted as epoch milliseconds;
/// the record returned from `upsert_record` is truncated the same way, so it
/// equals what a later `get_record` loads.
///
/// `sqlite::memory:` gives every pooled connection its own database; use a
/// file URL.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self::from_pool(pool);
        store.migrate().await?;
        tracing::info!(database_url, "sqlite learning store ready");
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        for statement in SQLITE_SCHEMA.split(';') {
            let sql: String = statement
                .lines()
                .filter(|line| !line.trim_start().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n");
            if sql.trim().is_empty() {
                continue;
            }
            sqlx::query(&sql).execute(&self.pool).await?;
        }
        Ok(())
    }
}

impl LearningStore for SqliteStore {
    async fn get_record(
        &self,
        learner_id: &str,
        item_id: &str,
    ) -> StoreResult<Option<LearningRecord>> {
        let sql = format!(
            r#"SELECT {SELECT_COLUMNS} FROM "learning_records" WHERE "learner_id" = ? AND "item_id" = ? LIMIT 1"#
        );
        let row = sqlx::query(&sql)
            .bind(learner_id)
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(map_row).transpose()
    }

    async fn upsert_record(&self, record: &LearningRecord) -> StoreResult<LearningRecord> {
        let updated_at = Utc::now().timestamp_millis();
        let next_version = record.version + 1;
        let next_version_db = to_i64(next_version, "version")?;

        let result = if record.version == 0 {
            sqlx::query(
                r#"
                INSERT INTO "learning_records"
                  ("ease_factor","interval_days","repetition_count","next_review_at","box_level",
                   "stage","correct_streak","longest_correct_streak","total_reviews","correct_reviews",
                   "first_introduced_at","last_reviewed_at","mastered_at","version","updated_at",
                   "learner_id","item_id")
                VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)
                ON CONFLICT ("learner_id","item_id") DO NOTHING
                "#,
            )
            .bind(record.ease_factor)
            .bind(i64::from(record.interval_days))
            .bind(i64::from(record.repetition_count))
            .bind(record.next_review_at.timestamp_millis())
            .bind(i64::from(record.box_level))
            .bind(record.stage.as_str())
            .bind(i64::from(record.correct_streak))
            .bind(i64::from(record.longest_correct_streak))
            .bind(i64::from(record.total_reviews))
            .bind(i64::from(record.correct_reviews))
            .bind(record.first_introduced_at.timestamp_millis())
            .bind(record.last_reviewed_at.map(|t| t.timestamp_millis()))
            .bind(record.mastered_at.map(|t| t.timestamp_millis()))
            .bind(next_version_db)
            .bind(updated_at)
            .bind(record.learner_id.as_str())
            .bind(record.item_id.as_str())
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                r#"
                UPDATE "learning_records" SET
                  "ease_factor" = ?, "interval_days" = ?, "repetition_count" = ?,
                  "next_review_at" = ?, "box_level" = ?, "stage" = ?, "correct_streak" = ?,
                  "longest_correct_streak" = ?, "total_reviews" = ?, "correct_reviews" = ?,
                  "first_introduced_at" = ?, "last_reviewed_at" = ?, "mastered_at" = ?,
                  "version" = ?, "updated_at" = ?
                WHERE "learner_id" = ? AND "item_id" = ? AND "version" = ?
                "#,
            )
            .bind(record.ease_factor)
            .bind(i64::from(record.interval_days))
            .bind(i64::from(record.repetition_count))
            .bind(record.next_review_at.timestamp_millis())
            .bind(i64::from(record.box_level))
            .bind(record.stage.as_str())
            .bind(i64::from(record.correct_streak))
            .bind(i64::from(record.longest_correct_streak))
            .bind(i64::from(record.total_reviews))
            .bind(i64::from(record.correct_reviews))
            .bind(record.first_introduced_at.timestamp_millis())
            .bind(record.last_reviewed_at.map(|t| t.timestamp_millis()))
            .bind(record.mastered_at.map(|t| t.timestamp_millis()))
            .bind(next_version_db)
            .bind(updated_at)
            .bind(record.learner_id.as_str())
            .bind(record.item_id.as_str())
            .bind(to_i64(record.version, "version")?)
            .execute(&self.pool)
            .await?
        };

        if result.rows_affected() == 0 {
            return Err(PersistenceError::Conflict {
                learner_id: record.learner_id.clone(),
                item_id: record.item_id.clone(),
            });
        }

        let mut stored = truncate_to_millis(record);
        stored.version = next_version;
        Ok(stored)
    }

    async fn query_records(
        &self,
        learner_id: &str,
        filter: &RecordFilter,
    ) -> StoreResult<Vec<LearningRecord>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            r#"SELECT {SELECT_COLUMNS} FROM "learning_records" WHERE "learner_id" = "#
        ));
        qb.push_bind(learner_id);

        if let Some(now) = filter.due_by {
            qb.push(r#" AND "stage" <> 'NEW' AND "next_review_at" <= "#);
            qb.push_bind(now.timestamp_millis());
        }
        if let Some(min) = filter.min_reviews {
            qb.push(r#" AND "total_reviews" >= "#);
            qb.push_bind(i64::from(min));
        }
        if let Some(stage) = filter.stage {
            qb.push(r#" AND "stage" = "#);
            qb.push_bind(stage.as_str());
        }
        qb.push(r#" ORDER BY "item_id" ASC"#);

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(map_row).collect()
    }

    async fn delete_record(&self, learner_id: &str, item_id: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"DELETE FROM "learning_records" WHERE "learner_id" = ? AND "item_id" = ?"#,
        )
        .bind(learner_id)
        .bind(item_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn map_row(row: &SqliteRow) -> StoreResult<LearningRecord> {
    let stage_raw: String = row.try_get("stage")?;
    let stage = stage_raw
        .parse::<Stage>()
        .map_err(|_| PersistenceError::Corrupt(format!("unknown stage {stage_raw}")))?;

    Ok(LearningRecord {
        learner_id: row.try_get("learner_id")?,
        item_id: row.try_get("item_id")?,
        ease_factor: row.try_get("ease_factor")?,
        interval_days: get_u32(row, "interval_days")?,
        repetition_count: get_u32(row, "repetition_count")?,
        next_review_at: from_millis(row.try_get("next_review_at")?)?,
        box_level: u8::try_from(row.try_get::<i64, _>("box_level")?)
            .map_err(|_| PersistenceError::Corrupt("box_level out of range".to_string()))?,
        stage,
        correct_streak: get_u32(row, "correct_streak")?,
        longest_correct_streak: get_u32(row, "longest_correct_streak")?,
        total_reviews: get_u32(row, "total_reviews")?,
        correct_reviews: get_u32(row, "correct_reviews")?,
        first_introduced_at: from_millis(row.try_get("first_introduced_at")?)?,
        last_reviewed_at: row
            .try_get::<Option<i64>, _>("last_reviewed_at")?
            .map(from_millis)
            .transpose()?,
        mastered_at: row
            .try_get::<Option<i64>, _>("mastered_at")?
            .map(from_millis)
            .transpose()?,
        version: u64::try_from(row.try_get::<i64, _>("version")?)
            .map_err(|_| PersistenceError::Corrupt("negative version".to_string()))?,
    })
}

fn get_u32(row: &SqliteRow, column: &str) -> StoreResult<u32> {
    let raw: i64 = row.try_get(column)?;
    u32::try_from(raw).map_err(|_| PersistenceError::Corrupt(format!("{column} out of range: {raw}")))
}

fn to_i64(value: u64, column: &str) -> StoreResult<i64> {
    i64::try_from(value).map_err(|_| PersistenceError::Corrupt(format!("{column} overflow")))
}

fn truncate_to_millis(record: &LearningRecord) -> LearningRecord {
    LearningRecord {
        next_review_at: record.next_review_at.trunc_subsecs(3),
        first_introduced_at: record.first_introduced_at.trunc_subsecs(3),
        last_reviewed_at: record.last_reviewed_at.map(|t| t.trunc_subsecs(3)),
        mastered_at: record.mastered_at.map(|t| t.trunc_subsecs(3)),
        ..record.clone()
    }
}

fn from_millis(ms: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| PersistenceError::Corrupt(format!("invalid timestamp {ms}")))
}
