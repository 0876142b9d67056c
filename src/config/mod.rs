//! Configuration module for the history cleaner.
//!
//! The cleaner is configured via a TOML file, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax. Job and listener
//! settings are carried as flat attribute maps (see [`attributes`]).
//!
//! # Example
//!
//! ```toml
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [listener.attributes]
//! "default.max.days" = 30
//! "default.max.revisions" = "${MAX_REVISIONS}"
//!
//! [jobs.deleted]
//! enabled = true
//! interval_secs = 3600
//! ```

pub mod attributes;
mod jobs;
mod observability;

use std::{path::Path, sync::LazyLock};

pub use jobs::*;
pub use observability::*;
use regex::Regex;
use serde::{Deserialize, Serialize};

static ENV_VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is valid"));

/// Root configuration for the history cleaner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CleanerConfig {
    /// Log output configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Prometheus endpoint configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Lifecycle listener and its retention policy attributes.
    #[serde(default)]
    pub listener: ListenerConfig,

    /// Scheduled cleaning jobs.
    #[serde(default)]
    pub jobs: JobsConfig,
}

impl CleanerConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;

        let config: CleanerConfig = toml::from_str(&expanded).map_err(ConfigError::Parse)?;

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.jobs.validate()?;

        if self.metrics.enabled && self.metrics.listen.trim().is_empty() {
            return Err(ConfigError::Validation(
                "metrics.listen must be set when metrics are enabled".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Expand `${VAR_NAME}` references, leaving anything after a `#` untouched.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');

        let mut line_result = String::with_capacity(line.len());
        let mut last_end = 0;

        for cap in ENV_VAR_PATTERN.captures_iter(line) {
            let Some(whole) = cap.get(0) else {
                continue;
            };

            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            line_result.push_str(&line[last_end..whole.start()]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            line_result.push_str(&value);

            last_end = whole.end();
        }

        line_result.push_str(&line[last_end..]);
        result.push_str(&line_result);
        result.push('\n');
    }

    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}
