//! Typed search predicates for the three cleaning passes.
//!
//! Not a query language: each cleaning service needs
//! exactly one shape of query, and the store decides how to evaluate it.

use std::fmt;

use chrono::{DateTime, TimeDelta, Timelike, Utc};
use uuid::Uuid;

use super::{Item, ItemKind, STATE_SUMMARY_NEW};

const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// What a predicate selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredicateFilter {
    /// Versionable items below (or equal to) the item with the given identifier.
    Versionable { under: Uuid },
    /// Items in the deleted-items holding area, optionally deleted before a cutoff.
    Deleted { deleted_before: Option<DateTime<Utc>> },
    /// Versionable items that were never published, optionally whose
    /// `date_property` lies before a cutoff.
    Unpublished {
        date_property: String,
        before: Option<DateTime<Utc>>,
    },
}

/// Sort order of a predicate query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderBy {
    Identifier,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub filter: PredicateFilter,
    pub order_by: Option<OrderBy>,
}

impl Predicate {
    /// Create an unordered predicate.
    pub fn new(filter: PredicateFilter) -> Self {
        Self {
            filter,
            order_by: None,
        }
    }

    pub fn ordered_by_identifier(mut self) -> Self {
        self.order_by = Some(OrderBy::Identifier);
        self
    }

    pub fn is_ordered(&self) -> bool {
        self.order_by.is_some()
    }

    /// Evaluate the predicate against an item.
    ///
    /// `lineage` holds the identifiers of the item and all of its ancestors.
    pub fn matches(&self, item: &Item, lineage: &[Uuid]) -> bool {
        match &self.filter {
            PredicateFilter::Versionable { under } => item.versionable && lineage.contains(under),
            PredicateFilter::Deleted { deleted_before } => {
                item.kind == ItemKind::Deleted
                    && match deleted_before {
                        None => true,
                        Some(cutoff) => item.deleted_at.is_some_and(|at| at < *cutoff),
                    }
            }
            PredicateFilter::Unpublished {
                date_property,
                before,
            } => {
                item.versionable
                    && item.state_summary.as_deref() == Some(STATE_SUMMARY_NEW)
                    && match before {
                        None => true,
                        Some(cutoff) => item
                            .dates
                            .get(date_property)
                            .is_some_and(|date| date < cutoff),
                    }
            }
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.filter {
            PredicateFilter::Versionable { under } => {
                write!(f, "//element(*, mix:versionable)[@hippo:paths='{under}']")?
            }
            PredicateFilter::Deleted {
                deleted_before: None,
            } => write!(f, "//element(*, hippo:deleted)")?,
            PredicateFilter::Deleted {
                deleted_before: Some(cutoff),
            } => write!(
                f,
                "//element(*, hippo:deleted)[@hippo:deletedDate < xs:dateTime(\"{}\")]",
                format_time(cutoff)
            )?,
            PredicateFilter::Unpublished { before: None, .. } => write!(
                f,
                "//element(*, mix:versionable)[@hippostd:stateSummary = '{STATE_SUMMARY_NEW}']"
            )?,
            PredicateFilter::Unpublished {
                date_property,
                before: Some(cutoff),
            } => write!(
                f,
                "//element(*, mix:versionable)[@hippostd:stateSummary = '{STATE_SUMMARY_NEW}' \
                 and @{date_property} and @{date_property} < xs:dateTime(\"{}\")]",
                format_time(cutoff)
            )?,
        }
        if let Some(OrderBy::Identifier) = self.order_by {
            write!(f, " order by @jcr:uuid")?;
        }
        Ok(())
    }
}

/// Format a timestamp the way query statements expect it.
pub fn format_time(time: &DateTime<Utc>) -> String {
    time.format(DATE_TIME_FORMAT).to_string()
}

/// Compute the eligibility cutoff for a grace period in minutes.
///
/// `now` is truncated to the minute. A grace period of zero yields that
/// truncated instant (no grace), a negative grace period disables the time
/// filter entirely and yields `None`.
pub fn grace_cutoff(now: DateTime<Utc>, minimum_minutes_to_live: i64) -> Option<DateTime<Utc>> {
    if minimum_minutes_to_live < 0 {
        return None;
    }
    let truncated = now
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);
    let cutoff = TimeDelta::try_minutes(minimum_minutes_to_live)
        .and_then(|grace| truncated.checked_sub_signed(grace))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    Some(cutoff)
}
