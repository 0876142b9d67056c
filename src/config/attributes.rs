//! Flat string-keyed job and listener attributes.
//!
//! Attributes are read leniently: values are trimmed, blanks count as unset,
//! and a value that fails to parse is logged and replaced by the caller's
//! default. A bad attribute never fails a run.
//!
//! ```toml
//! [jobs.revisions.attributes]
//! "batch.size" = 50
//! "default.max.revisions" = 10
//! "ns:news.max.days" = "30"
//! ```

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize};

pub const DEFAULT_MAX_DAYS: &str = "default.max.days";
pub const DEFAULT_MAX_REVISIONS: &str = "default.max.revisions";
pub const DEFAULT_TRUNCATE_ON_DELETE: &str = "default.truncate.ondelete";

/// Per-type property suffixes, as in `ns:news.max.days`.
pub const MAX_DAYS: &str = "max.days";
pub const MAX_REVISIONS: &str = "max.revisions";
pub const TRUNCATE_ON_DELETE: &str = "truncate.ondelete";

pub const MINIMUM_MINUTES_TO_LIVE: &str = "minimum.minutes.to.live";
pub const BATCH_SIZE: &str = "batch.size";
pub const BATCH_DELAY_MILLIS: &str = "batch.delay.millis";
pub const CLEANUP_PATH: &str = "cleanup.path";
pub const DEPUBLICATION_DATE_PROPERTY_NAME: &str = "depublication.date.property.name";

/// One year.
pub const DEFAULT_MINIMUM_MINUTES_TO_LIVE: i64 = 525_600;
pub const DEFAULT_CLEANUP_PATH: &str = "/content";
pub const DEFAULT_DEPUBLICATION_DATE_PROPERTY: &str = "hippostdpubwf:depublicationDate";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Attributes(BTreeMap<String, String>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Raw value, untrimmed.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Trimmed value, `None` when missing or blank.
    pub fn string(&self, key: &str) -> Option<String> {
        self.get(key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    pub fn parse_i64(&self, key: &str, default: i64) -> i64 {
        self.get(key)
            .map_or(default, |raw| parse_lenient(key, raw, default))
    }

    pub fn parse_bool(&self, key: &str, default: bool) -> bool {
        self.get(key)
            .map_or(default, |raw| parse_lenient_bool(key, raw, default))
    }
}

/// Parse a single attribute value, falling back to `default` on blank or bad input.
pub fn parse_lenient<T>(key: &str, raw: &str, default: T) -> T
where
    T: FromStr,
{
    let value = raw.trim();
    if value.is_empty() {
        return default;
    }
    match value.parse() {
        Ok(parsed) => parsed,
        Err(_) => {
            tracing::warn!(
                attribute = key,
                value = raw,
                expected = std::any::type_name::<T>(),
                "Configuration attribute cannot be parsed, using default"
            );
            default
        }
    }
}

/// Boolean counterpart of [`parse_lenient`]; accepts `true`/`false` in any case.
pub fn parse_lenient_bool(key: &str, raw: &str, default: bool) -> bool {
    let value = raw.trim();
    if value.is_empty() {
        return default;
    }
    if value.eq_ignore_ascii_case("true") {
        true
    } else if value.eq_ignore_ascii_case("false") {
        false
    } else {
        tracing::warn!(
            attribute = key,
            value = raw,
            expected = "bool",
            "Configuration attribute cannot be parsed, using default"
        );
        default
    }
}

impl<K, V> FromIterator<(K, V)> for Attributes
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A TOML scalar as written in an attribute table.
#[derive(Deserialize)]
#[serde(untagged)]
enum AttributeValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl<'de> Deserialize<'de> for Attributes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<String, AttributeValue>::deserialize(deserializer)?;
        Ok(raw
            .into_iter()
            .map(|(k, v)| (k, v.to_string()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::plain("42", 42)]
    #[case::padded("  7 ", 7)]
    #[case::negative("-1", -1)]
    #[case::blank("   ", 100)]
    #[case::garbage("ten", 100)]
    #[case::float("1.5", 100)]
    fn test_parse_i64(#[case] raw: &str, #[case] expected: i64) {
        let attrs = Attributes::new().with(BATCH_SIZE, raw);
        assert_eq!(attrs.parse_i64(BATCH_SIZE, 100), expected);
    }

    #[test]
    fn test_missing_attribute_uses_default() {
        let attrs = Attributes::new();
        assert_eq!(attrs.parse_i64(BATCH_SIZE, 100), 100);
        assert!(!attrs.parse_bool(DEFAULT_TRUNCATE_ON_DELETE, false));
        assert_eq!(attrs.string(CLEANUP_PATH), None);
    }

    #[rstest]
    #[case("true", false, true)]
    #[case("TRUE", false, true)]
    #[case(" false ", true, false)]
    #[case("yes", true, true)]
    #[case("", true, true)]
    fn test_parse_bool(#[case] raw: &str, #[case] default: bool, #[case] expected: bool) {
        let attrs = Attributes::new().with(DEFAULT_TRUNCATE_ON_DELETE, raw);
        assert_eq!(attrs.parse_bool(DEFAULT_TRUNCATE_ON_DELETE, default), expected);
    }

    #[test]
    fn test_string_trims_and_ignores_blank() {
        let attrs = Attributes::new()
            .with(CLEANUP_PATH, " /content/documents ")
            .with(DEPUBLICATION_DATE_PROPERTY_NAME, "  ");
        assert_eq!(
            attrs.string(CLEANUP_PATH).as_deref(),
            Some("/content/documents")
        );
        assert_eq!(attrs.string(DEPUBLICATION_DATE_PROPERTY_NAME), None);
    }

    #[test]
    fn test_deserialize_toml_scalars() {
        #[derive(Deserialize)]
        struct Wrapper {
            attributes: Attributes,
        }

        let wrapper: Wrapper = toml::from_str(
            r#"
            [attributes]
            "batch.size" = 50
            "batch.delay.millis" = "250"
            "default.truncate.ondelete" = true
            "ratio" = 0.5
            "#,
        )
        .unwrap();

        let attrs = wrapper.attributes;
        assert_eq!(attrs.get(BATCH_SIZE), Some("50"));
        assert_eq!(attrs.parse_i64(BATCH_DELAY_MILLIS, 1000), 250);
        assert!(attrs.parse_bool(DEFAULT_TRUNCATE_ON_DELETE, false));
        assert_eq!(attrs.get("ratio"), Some("0.5"));
    }

    #[test]
    fn test_deserialize_rejects_tables() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Wrapper {
            attributes: Attributes,
        }

        let result: Result<Wrapper, _> = toml::from_str(
            r#"
            [attributes.nested]
            key = 1
            "#,
        );
        assert!(result.is_err());
    }
}
