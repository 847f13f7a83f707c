use std::{
    fs,
    io::{self, BufRead},
    path,
};

use crate::RunnerConfig;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml::Error),
    #[error("Line parsing error: {0}")]
    LineParse(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Application context backed by a YAML document. The runner settings are
/// read from its `queue` section.
pub trait Configurable {
    fn config(&self) -> &serde_yaml::Value;

    fn load_config(
        config_file_path: impl AsRef<path::Path>,
    ) -> Result<serde_yaml::Value, ConfigError> {
        let path = config_file_path.as_ref();
        tracing::debug!(path = %path.display(), "loading config");
        let content = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Non-empty, trimmed lines of a text file, e.g. a list of seed urls.
    fn load_text_file_lines(
        file_path: impl AsRef<path::Path>,
    ) -> Result<Vec<String>, ConfigError> {
        let file = fs::File::open(file_path)?;
        io::BufReader::new(file)
            .lines()
            .map(|line| line.map_err(|e| ConfigError::LineParse(e.to_string())))
            .filter_map(|line| match line {
                Ok(line) if line.trim().is_empty() => None,
                Ok(line) => Some(Ok(line.trim().to_string())),
                Err(e) => Some(Err(e)),
            })
            .collect()
    }

    /// Look up a value with dot notation, i.e. "queue.parallel_limit".
    fn get_config_value(&self, key: &str) -> Option<&serde_yaml::Value> {
        if key.is_empty() {
            return None;
        }
        key.split('.')
            .try_fold(self.config(), |value, part| value.get(part))
    }

    /// Runner settings from the `queue` section, defaults when it is absent.
    fn runner_config(&self) -> Result<RunnerConfig, ConfigError> {
        let config = match self.get_config_value("queue") {
            Some(section) => serde_yaml::from_value(section.clone())?,
            None => RunnerConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }
}
