//! Scheduled job and lifecycle listener configuration.
//!
//! # Example
//!
//! ```toml
//! [listener]
//! enabled = true
//!
//! [listener.attributes]
//! "default.max.revisions" = 20
//! "ns:news.truncate.ondelete" = true
//!
//! [jobs.revisions]
//! enabled = true
//! interval_secs = 86400
//!
//! [jobs.revisions.attributes]
//! "cleanup.path" = "/content/documents"
//! "default.max.days" = 365
//!
//! [jobs.deleted]
//! enabled = true
//! interval_secs = 3600
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{ConfigError, attributes::Attributes};

/// Lifecycle event listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListenerConfig {
    /// Whether the daemon reacts to lifecycle events.
    /// Default: true
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Retention policy attributes (`default.*` and `<type>.*` keys).
    #[serde(default)]
    pub attributes: Attributes,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            attributes: Attributes::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// The three scheduled cleaning jobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobsConfig {
    /// Stale revision cleanup below `cleanup.path`.
    #[serde(default)]
    pub revisions: JobConfig,

    /// Purge of deleted items past their grace period.
    #[serde(default)]
    pub deleted: JobConfig,

    /// Expiry of never-published items past their depublication date.
    #[serde(default)]
    pub unpublished: JobConfig,
}

impl JobsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.revisions.validate("revisions")?;
        self.deleted.validate("deleted")?;
        self.unpublished.validate("unpublished")?;
        Ok(())
    }
}

/// One scheduled job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    /// Whether the daemon schedules this job.
    /// Default: false (must be explicitly enabled)
    #[serde(default)]
    pub enabled: bool,

    /// How often to run the job (in seconds).
    /// Default: 86400 (once per day)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Job attributes (`batch.size`, `minimum.minutes.to.live`, ...).
    #[serde(default)]
    pub attributes: Attributes,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_interval_secs(),
            attributes: Attributes::default(),
        }
    }
}

fn default_interval_secs() -> u64 {
    86_400
}

impl JobConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.enabled && self.interval_secs == 0 {
            return Err(ConfigError::Validation(format!(
                "jobs.{name}.interval_secs must be greater than 0"
            )));
        }
        Ok(())
    }
}
