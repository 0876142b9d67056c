//! Retention policy resolution.
//!
//! A [`PolicyTable`] is resolved once per run from flat attributes: a default
//! policy from the `default.*` keys plus one override per content type from
//! keys of the form `<namespace>:<name>.<property>`. A type entry starts as a
//! copy of the resolved default, so unset override fields inherit it. A value
//! that fails to parse falls back to the built-in unlimited value instead.

mod snapshot;

use std::{collections::HashMap, sync::LazyLock};

use regex::Regex;
use serde::Serialize;
pub use snapshot::PolicyHandle;

use crate::config::attributes::{
    Attributes, DEFAULT_MAX_DAYS, DEFAULT_MAX_REVISIONS, DEFAULT_TRUNCATE_ON_DELETE, MAX_DAYS,
    MAX_REVISIONS, TRUNCATE_ON_DELETE, parse_lenient, parse_lenient_bool,
};

static TYPE_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_\-]+:[A-Za-z_\-]+)\.(.+)$").expect("type key pattern is valid")
});

/// How much revision history survives for one content type.
///
/// Negative thresholds are unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetentionPolicy {
    pub max_age_days: i64,
    pub max_revision_count: i64,
    pub truncate_on_delete: bool,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::UNLIMITED
    }
}

impl RetentionPolicy {
    pub const UNLIMITED: Self = Self {
        max_age_days: -1,
        max_revision_count: -1,
        truncate_on_delete: false,
    };

    pub fn new(max_age_days: i64, max_revision_count: i64) -> Self {
        Self {
            max_age_days,
            max_revision_count,
            truncate_on_delete: false,
        }
    }

    pub fn with_truncate_on_delete(mut self, truncate: bool) -> Self {
        self.truncate_on_delete = truncate;
        self
    }

    pub fn has_max_age(&self) -> bool {
        self.max_age_days >= 0
    }

    pub fn has_max_revisions(&self) -> bool {
        self.max_revision_count >= 0
    }

    /// Neither threshold applies, so no history needs to be read at all.
    pub fn is_unlimited(&self) -> bool {
        !self.has_max_age() && !self.has_max_revisions()
    }
}

/// Default policy plus per-content-type overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PolicyTable {
    default: RetentionPolicy,
    types: HashMap<String, RetentionPolicy>,
}

impl PolicyTable {
    pub fn new(default: RetentionPolicy) -> Self {
        Self {
            default,
            types: HashMap::new(),
        }
    }

    pub fn with_type(mut self, content_type: impl Into<String>, policy: RetentionPolicy) -> Self {
        self.types.insert(content_type.into(), policy);
        self
    }

    /// Resolve the table from attributes. Never fails: unparseable values
    /// are logged and replaced by the built-in value for that field.
    pub fn resolve(attrs: &Attributes) -> Self {
        Self::resolve_entries(attrs.iter())
    }

    /// Resolve from raw `(key, value)` pairs in any order. The `default.*`
    /// keys are read before any type entry is seeded.
    pub fn resolve_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let entries: Vec<(&str, &str)> = entries.into_iter().collect();
        let builtin = RetentionPolicy::UNLIMITED;

        let mut default = builtin;
        for &(key, raw) in &entries {
            match key {
                DEFAULT_MAX_DAYS => default.max_age_days = parse_lenient(key, raw, builtin.max_age_days),
                DEFAULT_MAX_REVISIONS => {
                    default.max_revision_count = parse_lenient(key, raw, builtin.max_revision_count)
                }
                DEFAULT_TRUNCATE_ON_DELETE => {
                    default.truncate_on_delete =
                        parse_lenient_bool(key, raw, builtin.truncate_on_delete)
                }
                _ => {}
            }
        }

        let mut types: HashMap<String, RetentionPolicy> = HashMap::new();
        for (key, raw) in entries {
            let Some(captures) = TYPE_KEY.captures(key) else {
                continue;
            };
            let content_type = &captures[1];
            let entry = types.entry(content_type.to_string()).or_insert(default);
            match &captures[2] {
                MAX_DAYS => entry.max_age_days = parse_lenient(key, raw, builtin.max_age_days),
                MAX_REVISIONS => {
                    entry.max_revision_count = parse_lenient(key, raw, builtin.max_revision_count)
                }
                TRUNCATE_ON_DELETE => {
                    entry.truncate_on_delete =
                        parse_lenient_bool(key, raw, builtin.truncate_on_delete)
                }
                other => {
                    tracing::debug!(
                        content_type,
                        property = other,
                        "Ignoring unknown per-type retention property"
                    );
                }
            }
        }

        tracing::debug!(
            max_age_days = default.max_age_days,
            max_revision_count = default.max_revision_count,
            truncate_on_delete = default.truncate_on_delete,
            overrides = types.len(),
            "Resolved retention policies"
        );

        Self { default, types }
    }

    pub fn default_policy(&self) -> RetentionPolicy {
        self.default
    }

    /// Effective policy for a content type; the default when it has no override.
    pub fn policy_for(&self, content_type: &str) -> RetentionPolicy {
        self.types
            .get(content_type)
            .copied()
            .unwrap_or(self.default)
    }

    /// Content types with an explicit override, sorted.
    pub fn overridden_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.types.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}
