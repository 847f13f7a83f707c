use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

use crate::ConfigError;

pub const DEFAULT_STATISTICS_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_PERSISTENCE_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_CHECKPOINT_DIR: &str = "./temp";

/// Runner settings as they appear in a config file. Durations are given in
/// milliseconds, missing keys take their defaults.
///
/// ```yaml
/// queue:
///   parallel_limit: 4
///   max_processing_time_ms: 120000
///   retry_attempts: 2
///   checkpoint_key: hn-crawler
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub parallel_limit: usize,
    pub max_processing_time_ms: Option<u64>,
    pub min_processing_time_ms: Option<u64>,
    pub retry_attempts: u32,
    pub statistics_interval_ms: Option<u64>,
    pub persistence_interval_ms: Option<u64>,
    pub checkpoint_dir: String,
    /// Enables file checkpointing under `<checkpoint_dir>/<key>.json`.
    pub checkpoint_key: Option<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            parallel_limit: 1,
            max_processing_time_ms: None,
            min_processing_time_ms: None,
            retry_attempts: 1,
            statistics_interval_ms: None,
            persistence_interval_ms: None,
            checkpoint_dir: DEFAULT_CHECKPOINT_DIR.to_string(),
            checkpoint_key: None,
        }
    }
}

impl RunnerConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parallel_limit < 1 {
            return Err(ConfigError::Invalid(format!(
                "parallel_limit must be higher than 0, got {}",
                self.parallel_limit
            )));
        }
        if self.statistics_interval_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "statistics_interval_ms must be higher than 0".to_string(),
            ));
        }
        if self.persistence_interval_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "persistence_interval_ms must be higher than 0".to_string(),
            ));
        }
        if self.checkpoint_key.as_deref() == Some("") {
            return Err(ConfigError::Invalid(
                "checkpoint_key must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn max_processing_time(&self) -> Option<Duration> {
        self.max_processing_time_ms.map(Duration::from_millis)
    }

    pub fn min_processing_time(&self) -> Option<Duration> {
        self.min_processing_time_ms.map(Duration::from_millis)
    }

    pub fn statistics_interval(&self) -> Duration {
        self.statistics_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_STATISTICS_INTERVAL)
    }

    pub fn persistence_interval(&self) -> Duration {
        self.persistence_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_PERSISTENCE_INTERVAL)
    }
}
