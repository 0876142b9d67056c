//! Cleaning job runner and periodic worker.

use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
    config::attributes::{
        Attributes, BATCH_DELAY_MILLIS, BATCH_SIZE, CLEANUP_PATH, DEFAULT_CLEANUP_PATH,
        DEFAULT_DEPUBLICATION_DATE_PROPERTY, DEFAULT_MINIMUM_MINUTES_TO_LIVE,
        DEPUBLICATION_DATE_PROPERTY_NAME, MINIMUM_MINUTES_TO_LIVE,
    },
    observability::metrics,
    policy::PolicyTable,
    query::{
        BatchedQueryExecutor, DEFAULT_BATCH_DELAY, DEFAULT_BATCH_SIZE, ExecutionReport,
        ExecutorError,
    },
    services::{CleaningService, DeletedStrategy, RevisionsStrategy, UnpublishedStrategy},
    store::{Repository, StoreError},
};

/// The scheduled cleaning passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleaningJob {
    Revisions,
    DeletedItems,
    UnpublishedItems,
}

impl CleaningJob {
    pub fn name(&self) -> &'static str {
        match self {
            CleaningJob::Revisions => "revisions",
            CleaningJob::DeletedItems => "deleted",
            CleaningJob::UnpublishedItems => "unpublished",
        }
    }
}

impl fmt::Display for CleaningJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Identifier could not be found for cleanup path: {0}")]
    CleanupPathNotFound(String),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Results from a single job run.
#[derive(Debug, Clone, Default)]
pub struct JobRunResult {
    pub report: ExecutionReport,
    /// Duration of the run in milliseconds.
    pub duration_ms: u64,
}

impl JobRunResult {
    /// Check if the run handed any item to its service.
    pub fn has_work(&self) -> bool {
        self.report.processed > 0
    }
}

fn executor_from(attrs: &Attributes) -> BatchedQueryExecutor {
    // Zero or negative disables throttling.
    let batch_size = attrs.parse_i64(BATCH_SIZE, i64::from(DEFAULT_BATCH_SIZE));
    let batch_size = u32::try_from(batch_size.max(0)).unwrap_or(u32::MAX);
    let delay_millis = attrs.parse_i64(BATCH_DELAY_MILLIS, DEFAULT_BATCH_DELAY.as_millis() as i64);
    BatchedQueryExecutor::new(
        batch_size,
        Duration::from_millis(u64::try_from(delay_millis).unwrap_or(0)),
    )
}

/// Run a single pass of `job` in a fresh session.
pub async fn run_job(
    job: CleaningJob,
    repository: &dyn Repository,
    attrs: &Attributes,
    cancel: &CancellationToken,
) -> Result<JobRunResult, JobError> {
    let start = Instant::now();
    let session = repository.login().await?;
    let executor = executor_from(attrs);

    let report = match job {
        CleaningJob::Revisions => {
            let cleanup_path = attrs
                .string(CLEANUP_PATH)
                .unwrap_or_else(|| DEFAULT_CLEANUP_PATH.to_string());
            let Some(root) = session.item_by_path(&cleanup_path).await? else {
                return Err(JobError::CleanupPathNotFound(cleanup_path));
            };
            let policies = Arc::new(PolicyTable::resolve(attrs));
            CleaningService::new(RevisionsStrategy::new(root.id, policies), executor)
                .clean_nodes(session.as_ref(), cancel)
                .await?
        }
        CleaningJob::DeletedItems => {
            let minutes = attrs.parse_i64(MINIMUM_MINUTES_TO_LIVE, DEFAULT_MINIMUM_MINUTES_TO_LIVE);
            CleaningService::new(DeletedStrategy::new(minutes), executor)
                .clean_nodes(session.as_ref(), cancel)
                .await?
        }
        CleaningJob::UnpublishedItems => {
            let minutes = attrs.parse_i64(MINIMUM_MINUTES_TO_LIVE, DEFAULT_MINIMUM_MINUTES_TO_LIVE);
            let date_property = attrs
                .string(DEPUBLICATION_DATE_PROPERTY_NAME)
                .unwrap_or_else(|| DEFAULT_DEPUBLICATION_DATE_PROPERTY.to_string());
            let strategy = UnpublishedStrategy::new(date_property, minutes, repository.workflow());
            CleaningService::new(strategy, executor)
                .clean_nodes(session.as_ref(), cancel)
                .await?
        }
    };

    Ok(JobRunResult {
        report,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Starts a cleaning job as a periodic background worker.
///
/// The first pass runs immediately; the worker stops when `cancel` fires,
/// either between passes or at the next throttle wait inside a pass.
pub async fn start_cleaning_worker(
    job: CleaningJob,
    repository: Arc<dyn Repository>,
    attrs: Attributes,
    interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        job = %job,
        interval_secs = interval.as_secs(),
        attributes = attrs.len(),
        "Starting cleaning worker"
    );

    loop {
        match run_job(job, repository.as_ref(), &attrs, &cancel).await {
            Ok(result) => {
                if result.has_work() {
                    tracing::info!(
                        job = %job,
                        cleaned = result.report.cleaned(),
                        failed = result.report.failed,
                        skipped = result.report.skipped,
                        duration_ms = result.duration_ms,
                        "Cleaning job run complete"
                    );
                } else {
                    tracing::debug!(job = %job, "Cleaning job run complete, nothing to clean up");
                }
            }
            Err(e) => {
                tracing::error!(job = %job, error = %e, "Error running cleaning job");
                metrics::record_job_error(job.name());
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    tracing::info!(job = %job, "Cleaning worker stopped");
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, Utc};
    use rstest::rstest;

    use super::*;
    use crate::{
        config::attributes::{DEFAULT_MAX_REVISIONS, MAX_REVISIONS},
        store::memory::{MemoryRepository, fixtures},
    };

    #[test]
    fn test_executor_from_attributes() {
        let executor = executor_from(&Attributes::new());
        assert_eq!(executor.batch_size(), DEFAULT_BATCH_SIZE);
        assert_eq!(executor.batch_delay(), DEFAULT_BATCH_DELAY);

        let attrs = Attributes::new()
            .with(BATCH_SIZE, "5")
            .with(BATCH_DELAY_MILLIS, "-10");
        let executor = executor_from(&attrs);
        assert_eq!(executor.batch_size(), 5);
        assert_eq!(executor.batch_delay(), Duration::ZERO);

        let executor = executor_from(&Attributes::new().with(BATCH_SIZE, "many"));
        assert_eq!(executor.batch_size(), DEFAULT_BATCH_SIZE);
    }

    #[rstest]
    #[case::negative("-1", 0)]
    #[case::very_negative("-5000000000", 0)]
    #[case::zero("0", 0)]
    #[case::oversized("5000000000", u32::MAX)]
    fn test_batch_size_outside_u32_range(#[case] raw: &str, #[case] expected: u32) {
        let executor = executor_from(&Attributes::new().with(BATCH_SIZE, raw));
        assert_eq!(executor.batch_size(), expected);
    }

    #[tokio::test]
    async fn test_revisions_job_uses_policy_attributes() {
        let repo = MemoryRepository::new();
        let now = Utc::now();
        let news = fixtures::document(&repo, "/content/documents", "n", "ns:news");
        let page = fixtures::document(&repo, "/content/documents", "p", "ns:page");
        fixtures::add_revisions(&repo, news.preview.id, now, &[4, 3, 2, 1]);
        fixtures::add_revisions(&repo, page.preview.id, now, &[4, 3, 2, 1]);

        let attrs = Attributes::new()
            .with(DEFAULT_MAX_REVISIONS, "2")
            .with(format!("ns:news.{MAX_REVISIONS}"), "1")
            .with(BATCH_DELAY_MILLIS, "0");
        let result = run_job(CleaningJob::Revisions, &repo, &attrs, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.report.cleaned(), 2);
        assert_eq!(repo.history(news.preview.id).len(), 2);
        assert_eq!(repo.history(page.preview.id).len(), 3);
    }

    #[tokio::test]
    async fn test_revisions_job_requires_cleanup_path() {
        let repo = MemoryRepository::new();
        fixtures::document(&repo, "/content/documents", "n", "ns:news");

        let attrs = Attributes::new().with(CLEANUP_PATH, "/content/missing");
        let err = run_job(CleaningJob::Revisions, &repo, &attrs, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::CleanupPathNotFound(path) if path == "/content/missing"));
    }

    #[tokio::test]
    async fn test_deleted_job_default_grace_keeps_recent_items() {
        let repo = MemoryRepository::new();
        let now = Utc::now();
        let recent = fixtures::deleted_document(&repo, "r", "ns:doc", Some(now - TimeDelta::days(30)));
        let ancient = fixtures::deleted_document(&repo, "a", "ns:doc", Some(now - TimeDelta::days(400)));
        fixtures::add_revisions(&repo, recent.preview.id, now, &[31]);
        fixtures::add_revisions(&repo, ancient.preview.id, now, &[401]);

        let result = run_job(
            CleaningJob::DeletedItems,
            &repo,
            &Attributes::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(result.report.total, 1);
        assert_eq!(repo.history(ancient.preview.id).len(), 1);
        assert_eq!(repo.history(recent.preview.id).len(), 2);
    }

    #[tokio::test]
    async fn test_unpublished_job_uses_repository_workflow() {
        let repo = MemoryRepository::new();
        let doc = fixtures::document(&repo, "/content/documents", "draft", "ns:doc");

        let attrs = Attributes::new().with(MINIMUM_MINUTES_TO_LIVE, "-1");
        let result = run_job(CleaningJob::UnpublishedItems, &repo, &attrs, &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.has_work());
        assert!(repo.snapshot().items[&doc.preview.id].in_attic());
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_runs_until_cancelled() {
        let repo = MemoryRepository::new();
        let now = Utc::now();
        let doc = fixtures::deleted_document(&repo, "gone", "ns:doc", Some(now - TimeDelta::days(1)));
        fixtures::add_revisions(&repo, doc.preview.id, now, &[2]);

        let cancel = CancellationToken::new();
        let attrs = Attributes::new().with(MINIMUM_MINUTES_TO_LIVE, "0");
        let worker = tokio::spawn(start_cleaning_worker(
            CleaningJob::DeletedItems,
            Arc::new(repo.clone()),
            attrs,
            Duration::from_secs(60),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(repo.history(doc.preview.id).len(), 1);

        cancel.cancel();
        worker.await.unwrap();
    }
}
