use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::CleaningStrategy;
use crate::{
    store::{
        ContentSession, DocumentWorkflow, Item, Predicate, PredicateFilter,
        predicate::grace_cutoff,
    },
    tasks::{DeleteItemTask, DeleteOutcome, TaskResult},
};

/// Delete never-published documents whose depublication date has passed
/// the grace period. The workflow moves them to the attic, where the
/// deleted-item purge picks them up later.
pub struct UnpublishedStrategy {
    date_property: String,
    minimum_minutes_to_live: i64,
    workflow: Arc<dyn DocumentWorkflow>,
}

impl UnpublishedStrategy {
    pub fn new(
        date_property: impl Into<String>,
        minimum_minutes_to_live: i64,
        workflow: Arc<dyn DocumentWorkflow>,
    ) -> Self {
        Self {
            date_property: date_property.into(),
            minimum_minutes_to_live,
            workflow,
        }
    }
}

#[async_trait]
impl CleaningStrategy for UnpublishedStrategy {
    const NAME: &'static str = "unpublished";

    fn build_predicate(&self, now: DateTime<Utc>) -> Predicate {
        Predicate::new(PredicateFilter::Unpublished {
            date_property: self.date_property.clone(),
            before: grace_cutoff(now, self.minimum_minutes_to_live),
        })
        .ordered_by_identifier()
    }

    async fn clean_item(
        &self,
        session: &dyn ContentSession,
        item: Item,
        _now: DateTime<Utc>,
    ) -> TaskResult<()> {
        tracing::debug!(path = %item.path, "Create delete document task");
        let outcome = DeleteItemTask::new(session, self.workflow.as_ref(), item)?
            .execute()
            .await?;
        if outcome != DeleteOutcome::Deleted {
            tracing::debug!(outcome = ?outcome, "Document left in place");
        }
        Ok(())
    }
}
