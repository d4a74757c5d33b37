use std::path::PathBuf;

use serde::{Deserialize, Serialize};

const DEFAULT_DATABASE_URL: &str = "sqlite:vocab_mastery.db?mode=rwc";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub log: LogConfig,
    pub engine: EngineConfig,
}

impl Config {
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        Self {
            database_url,
            log: LogConfig::from_env(),
            engine: EngineConfig::from_env(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `info` or `vocab_mastery=debug`.
    pub level: String,
    /// Directory for the daily rolling log file; `None` logs to stderr only.
    pub file_dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_dir: None,
        }
    }
}

impl LogConfig {
    /// Reads `RUST_LOG`, `ENABLE_FILE_LOGS` and `LOG_DIR`.
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var("RUST_LOG").ok(),
            std::env::var("ENABLE_FILE_LOGS").ok(),
            std::env::var("LOG_DIR").ok(),
        )
    }

    fn from_vars(level: Option<String>, enable_files: Option<String>, dir: Option<String>) -> Self {
        let level = level
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "info".to_string());
        let enabled = matches!(
            enable_files.as_deref().map(str::trim),
            Some("true") | Some("1")
        );
        let file_dir = enabled.then(|| {
            dir.filter(|value| !value.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./logs"))
        });
        Self { level, file_dir }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Upper bound for a computed review interval.
    pub max_interval_days: u32,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            max_interval_days: 36500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Overdue beyond this many days flags an item as severely overdue.
    pub severe_overdue_days: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            severe_overdue_days: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrugglingConfig {
    pub threshold: f64,
    pub min_reviews: u32,
}

impl Default for StrugglingConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            min_reviews: 1,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub recorder: RecorderConfig,
    pub scheduler: SchedulerConfig,
    pub struggling: StrugglingConfig,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(days) = env_parse::<u32>("SRS_MAX_INTERVAL_DAYS").filter(|d| *d >= 1) {
            config.recorder.max_interval_days = days;
        }
        if let Some(days) = env_parse::<i64>("SRS_SEVERE_OVERDUE_DAYS").filter(|d| *d >= 0) {
            config.scheduler.severe_overdue_days = days;
        }
        if let Some(threshold) =
            env_parse::<f64>("SRS_STRUGGLING_THRESHOLD").filter(|t| (0.0..=1.0).contains(t))
        {
            config.struggling.threshold = threshold;
        }
        if let Some(min) = env_parse::<u32>("SRS_STRUGGLING_MIN_REVIEWS").filter(|m| *m >= 1) {
            config.struggling.min_reviews = min;
        }

        config
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable config value");
            None
        }
    }
}
