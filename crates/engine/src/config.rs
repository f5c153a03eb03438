//! Engine configuration: polling cadence and worker pool size.
//!
//! Loaded from `<config_dir>/confluo/engine.json` unless `CONFLUO_CONFIG_PATH` points elsewhere.
//! A missing file yields defaults.

use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use dirs_next::{config_dir, home_dir};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::executor::ExecutorConfig;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_CONCURRENT_RUNS: usize = 16;

const CONFIG_PATH_ENV: &str = "CONFLUO_CONFIG_PATH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid interval '{value}': {reason}")]
    InvalidInterval { value: String, reason: String },

    #[error("max_concurrent_runs must be at least 1")]
    InvalidConcurrency,
}

/// On-disk engine settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "snake_case")]
pub struct EngineConfig {
    /// Interval between trigger polls, e.g. `"30s"`, `"5m"`, `"1h"`, `"250ms"` or bare seconds.
    pub poll_interval: String,
    pub max_concurrent_runs: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: "30s".to_string(),
            max_concurrent_runs: DEFAULT_MAX_CONCURRENT_RUNS,
        }
    }
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Result<Duration, ConfigError> {
        parse_interval(&self.poll_interval)
    }

    pub fn executor_config(&self) -> Result<ExecutorConfig, ConfigError> {
        Ok(ExecutorConfig {
            poll_interval: self.poll_interval()?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.poll_interval()?;
        if self.max_concurrent_runs == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }
        Ok(())
    }
}

/// Returns the default path for the engine configuration file.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_ENV)
        && !path.trim().is_empty()
    {
        return expand_tilde(path.trim());
    }

    config_dir().unwrap_or_else(|| PathBuf::from(".")).join("confluo").join("engine.json")
}

/// Loads engine configuration from the default path.
pub fn load_config() -> Result<EngineConfig, ConfigError> {
    load_config_from_path(&default_config_path())
}

/// Loads engine configuration from `path`, falling back to defaults when the file is absent.
pub fn load_config_from_path(path: &Path) -> Result<EngineConfig, ConfigError> {
    if !path.exists() {
        return Ok(EngineConfig::default());
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: EngineConfig = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

/// Parses `"250ms"`, `"30s"`, `"5m"`, `"1h"` or bare seconds. Zero is rejected.
pub fn parse_interval(raw_interval: &str) -> Result<Duration, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidInterval {
        value: raw_interval.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = raw_interval.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty"));
    }

    let split_at = trimmed.find(|character: char| !character.is_ascii_digit()).unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split_at);
    let value: u64 = number.parse().map_err(|_| invalid("expected a whole number"))?;
    let duration = match unit.trim().to_ascii_lowercase().as_str() {
        "ms" => Duration::from_millis(value),
        "" | "s" => Duration::from_secs(value),
        "m" => Duration::from_secs(value.saturating_mul(60)),
        "h" => Duration::from_secs(value.saturating_mul(3600)),
        _ => return Err(invalid("unknown unit; use ms, s, m or h")),
    };
    if duration.is_zero() {
        return Err(invalid("must be greater than zero"));
    }
    Ok(duration)
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn default_path_honors_environment_override() {
        temp_env::with_var(CONFIG_PATH_ENV, Some("/tmp/confluo/custom.json"), || {
            assert_eq!(default_config_path(), PathBuf::from("/tmp/confluo/custom.json"));
        });
        temp_env::with_var(CONFIG_PATH_ENV, None::<&str>, || {
            assert!(default_config_path().ends_with("confluo/engine.json"));
        });
    }

    #[test]
    fn missing_file_yields_defaults() {
        let directory = tempfile::tempdir().expect("tempdir");
        let config = load_config_from_path(&directory.path().join("engine.json")).expect("defaults");
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.poll_interval().expect("interval"), DEFAULT_POLL_INTERVAL);
    }

    #[test]
    fn file_values_are_loaded_and_validated() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"poll_interval": "5m", "max_concurrent_runs": 4}}"#).expect("write config");

        let config = load_config_from_path(file.path()).expect("config loads");
        assert_eq!(config.max_concurrent_runs, 4);
        assert_eq!(config.poll_interval().expect("interval"), Duration::from_secs(300));
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"poll_interval": "10s"}}"#).expect("write config");

        let config = load_config_from_path(file.path()).expect("config loads");
        assert_eq!(config.max_concurrent_runs, DEFAULT_MAX_CONCURRENT_RUNS);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"poll_interval": "0s", "max_concurrent_runs": 4}}"#).expect("write config");
        assert!(matches!(
            load_config_from_path(file.path()),
            Err(ConfigError::InvalidInterval { .. })
        ));

        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"max_concurrent_runs": 0}}"#).expect("write config");
        assert!(matches!(load_config_from_path(file.path()), Err(ConfigError::InvalidConcurrency)));

        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "not json").expect("write config");
        assert!(matches!(load_config_from_path(file.path()), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn intervals_accept_common_units() {
        assert_eq!(parse_interval("250ms").ok(), Some(Duration::from_millis(250)));
        assert_eq!(parse_interval("30").ok(), Some(Duration::from_secs(30)));
        assert_eq!(parse_interval(" 2M ").ok(), Some(Duration::from_secs(120)));
        assert_eq!(parse_interval("1h").ok(), Some(Duration::from_secs(3600)));
        assert!(parse_interval("").is_err());
        assert!(parse_interval("fast").is_err());
        assert!(parse_interval("10d").is_err());
    }
}
