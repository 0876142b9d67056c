use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::CleaningStrategy;
use crate::{
    store::{ContentSession, Item, Predicate, PredicateFilter, predicate::grace_cutoff},
    tasks::{TaskResult, TruncateHistoryTask},
};

/// Purge deleted items from the attic once their grace period is over,
/// dropping their whole revision history.
pub struct DeletedStrategy {
    minimum_minutes_to_live: i64,
}

impl DeletedStrategy {
    /// A negative grace period selects every deleted item regardless of date.
    pub fn new(minimum_minutes_to_live: i64) -> Self {
        Self {
            minimum_minutes_to_live,
        }
    }
}

#[async_trait]
impl CleaningStrategy for DeletedStrategy {
    const NAME: &'static str = "deleted";

    fn build_predicate(&self, now: DateTime<Utc>) -> Predicate {
        Predicate::new(PredicateFilter::Deleted {
            deleted_before: grace_cutoff(now, self.minimum_minutes_to_live),
        })
        .ordered_by_identifier()
    }

    async fn clean_item(
        &self,
        session: &dyn ContentSession,
        item: Item,
        _now: DateTime<Utc>,
    ) -> TaskResult<()> {
        let removed = TruncateHistoryTask::new(session, item)?.execute().await?;
        tracing::debug!(removed, "Deleted item history truncated");
        Ok(())
    }
}
