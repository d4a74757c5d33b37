use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use vocab_mastery::config::Config;
use vocab_mastery::db::SqliteStore;
use vocab_mastery::logging::init_tracing;
use vocab_mastery::services::{EngineResult, LearningEngine};

const DEFAULT_REPORT_LIMIT: usize = 20;

/// Prints a learner's due counts, due queue and mastery stats as JSON.
/// Meant to be invoked periodically by whatever refreshes due badges.
#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = init_tracing(&config.log);

    let mut args = std::env::args().skip(1);
    let Some(learner_id) = args.next() else {
        eprintln!("usage: vocab-mastery <learner-id> [limit]");
        return ExitCode::from(2);
    };
    let limit = args
        .next()
        .and_then(|raw| raw.parse::<usize>().ok())
        .unwrap_or(DEFAULT_REPORT_LIMIT);

    let store = match SqliteStore::connect(&config.database_url).await {
        Ok(store) => Arc::new(store),
        Err(err) => {
            tracing::error!(error = %err, "failed to open learning store");
            return ExitCode::FAILURE;
        }
    };
    let engine = LearningEngine::new(store, config.engine.clone());

    match report(&engine, &learner_id, limit).await {
        Ok(report) => {
            println!("{report}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(error = %err, learner_id = %learner_id, "report failed");
            ExitCode::FAILURE
        }
    }
}

async fn report(
    engine: &LearningEngine<SqliteStore>,
    learner_id: &str,
    limit: usize,
) -> EngineResult<serde_json::Value> {
    let now = Utc::now();
    let summary = engine.get_due_summary(learner_id, now).await?;
    let due = engine.get_scheduled_reviews(learner_id, now, Some(limit)).await?;
    let stats = engine.get_mastery_stats(learner_id).await?;

    tracing::info!(
        learner_id,
        due_now = summary.due_now,
        severely_overdue = summary.severely_overdue,
        "due counts recomputed"
    );

    Ok(json!({
        "learnerId": learner_id,
        "generatedAt": now,
        "summary": summary,
        "due": due,
        "stats": stats,
    }))
}
