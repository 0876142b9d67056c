//! Cleaning services: one batching skeleton, three strategies.
//!
//! A [`CleaningStrategy`] contributes the discovery predicate and the action
//! for one item; [`CleaningService`] drives it through the
//! [`BatchedQueryExecutor`] and owns the per-item commit and rollback.
//!
//! - [`RevisionsStrategy`]: prune stale revisions below a root item.
//! - [`DeletedStrategy`]: purge deleted items past their grace period.
//! - [`UnpublishedStrategy`]: delete never-published items past their
//!   depublication date.

mod deleted;
mod revisions;
mod unpublished;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
pub use deleted::DeletedStrategy;
pub use revisions::RevisionsStrategy;
use tokio_util::sync::CancellationToken;
pub use unpublished::UnpublishedStrategy;

use crate::{
    observability::metrics,
    query::{BatchedQueryExecutor, ExecutionReport, ExecutorError, ItemOutcome},
    store::{ContentSession, Item, Predicate},
    tasks::{TaskError, TaskResult},
};

/// Query and per-item action of one cleaning pass.
#[async_trait]
pub trait CleaningStrategy: Send + Sync {
    /// Short name used in logs and metric labels.
    const NAME: &'static str;

    /// Ordered predicate selecting the items to clean, evaluated at `now`.
    fn build_predicate(&self, now: DateTime<Utc>) -> Predicate;

    /// Stage the changes for one item. Committing is left to the service.
    async fn clean_item(
        &self,
        session: &dyn ContentSession,
        item: Item,
        now: DateTime<Utc>,
    ) -> TaskResult<()>;
}

/// Runs a [`CleaningStrategy`] over every item its predicate selects,
/// committing each item on its own.
pub struct CleaningService<S> {
    strategy: S,
    executor: BatchedQueryExecutor,
}

impl<S: CleaningStrategy> CleaningService<S> {
    pub fn new(strategy: S, executor: BatchedQueryExecutor) -> Self {
        Self { strategy, executor }
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Clean every matching item.
    ///
    /// Only discovery errors are returned; a failing item is logged, rolled
    /// back and counted in the report.
    pub async fn clean_nodes(
        &self,
        session: &dyn ContentSession,
        cancel: &CancellationToken,
    ) -> Result<ExecutionReport, ExecutorError> {
        self.clean_nodes_at(session, Utc::now(), cancel).await
    }

    /// [`clean_nodes`](Self::clean_nodes) with an explicit clock.
    pub async fn clean_nodes_at(
        &self,
        session: &dyn ContentSession,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<ExecutionReport, ExecutorError> {
        let predicate = self.strategy.build_predicate(now);
        tracing::debug!(job = S::NAME, query = %predicate, "Cleaning query");

        let report = self
            .executor
            .execute(session, &predicate, cancel, move |item| {
                self.process(session, item, now)
            })
            .await?;

        metrics::record_items_processed(S::NAME, "cleaned", report.cleaned() as u64);
        metrics::record_items_processed(S::NAME, "failed", report.failed as u64);
        metrics::record_items_processed(S::NAME, "skipped", report.skipped as u64);

        tracing::info!(
            job = S::NAME,
            total = report.total,
            cleaned = report.cleaned(),
            failed = report.failed,
            skipped = report.skipped,
            interrupted = report.interrupted,
            "Cleaning pass complete"
        );
        Ok(report)
    }

    async fn process(
        &self,
        session: &dyn ContentSession,
        item: Item,
        now: DateTime<Utc>,
    ) -> ItemOutcome {
        let path = item.path.clone();

        let result = match self.strategy.clean_item(session, item, now).await {
            Ok(()) => session.save().await.map_err(TaskError::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => ItemOutcome::Cleaned,
            Err(TaskError::IllegalItem(reason)) => {
                tracing::error!(job = S::NAME, path = %path, reason = %reason, "Item does not qualify for cleaning");
                ItemOutcome::Failed
            }
            Err(e) => {
                tracing::error!(job = S::NAME, path = %path, error = %e, "Failed to clean item");
                if let Err(e) = session.discard().await {
                    tracing::error!(job = S::NAME, error = %e, "Failed to discard session changes");
                }
                ItemOutcome::Failed
            }
        }
    }
}
