use std::{collections::HashSet, future::Future, time::Duration};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::store::{ContentSession, Item, Predicate, StoreError};

pub const DEFAULT_BATCH_SIZE: u32 = 100;
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_DISCOVERY_PAGE_SIZE: u64 = 1000;

#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Paging over an unordered result set that is being mutated is unsafe.
    #[error("Query must be ordered for batched discovery: {0}")]
    UnorderedQuery(String),

    #[error("Discovery query failed: {0}")]
    Store(#[from] StoreError),
}

/// Result of processing one item, reported by the per-item function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Cleaned,
    /// The item failed; the function already logged and rolled back.
    Failed,
}

/// Counts for one execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Identifiers collected during discovery.
    pub total: usize,
    /// Items handed to the per-item function (including failed ones).
    pub processed: usize,
    /// Items that could not be fetched.
    pub skipped: usize,
    pub failed: usize,
    pub batch_pauses: usize,
    /// Whether a throttle wait was cancelled before all items were attempted.
    pub interrupted: bool,
}

impl ExecutionReport {
    pub fn cleaned(&self) -> usize {
        self.processed - self.failed
    }
}

#[derive(Debug, Clone)]
pub struct BatchedQueryExecutor {
    batch_size: u32,
    batch_delay: Duration,
    item_delay: Option<Duration>,
    discovery_page_size: u64,
}

impl Default for BatchedQueryExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE, DEFAULT_BATCH_DELAY)
    }
}

impl BatchedQueryExecutor {
    /// `batch_size == 0` disables throttling.
    pub fn new(batch_size: u32, batch_delay: Duration) -> Self {
        Self {
            batch_size,
            batch_delay,
            item_delay: None,
            discovery_page_size: DEFAULT_DISCOVERY_PAGE_SIZE,
        }
    }

    /// Pause after every processed item. `None` disables the pause.
    pub fn with_item_delay(mut self, item_delay: Option<Duration>) -> Self {
        self.item_delay = item_delay;
        self
    }

    /// Page size of discovery queries. `0` runs discovery as one unpaged query.
    pub fn with_discovery_page_size(mut self, page_size: u64) -> Self {
        self.discovery_page_size = page_size;
        self
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    pub fn batch_delay(&self) -> Duration {
        self.batch_delay
    }

    /// Phase one: collect the identifiers of every item matching `predicate`.
    ///
    /// The store's total is re-read after every page, so a result set that
    /// shrinks while paging ends discovery early instead of failing it.
    pub async fn discover(
        &self,
        session: &dyn ContentSession,
        predicate: &Predicate,
    ) -> Result<Vec<Uuid>, ExecutorError> {
        if !predicate.is_ordered() {
            return Err(ExecutorError::UnorderedQuery(predicate.to_string()));
        }

        let mut seen = HashSet::new();
        let mut ids = Vec::new();

        if self.discovery_page_size == 0 {
            let page = session.query(predicate, 0, None).await?;
            for id in page.ids {
                if seen.insert(id) {
                    ids.push(id);
                }
            }
            return Ok(ids);
        }

        let mut offset = 0u64;
        loop {
            let page = session
                .query(predicate, offset, Some(self.discovery_page_size))
                .await?;
            let fetched = page.ids.len() as u64;
            for id in page.ids {
                if seen.insert(id) {
                    ids.push(id);
                }
            }
            offset += self.discovery_page_size;

            tracing::trace!(
                offset,
                fetched,
                total_size = ?page.total_size,
                collected = ids.len(),
                "Discovery page"
            );

            let more = match page.total_size {
                Some(total) => offset < total,
                None => fetched == self.discovery_page_size,
            };
            if !more || fetched == 0 {
                break;
            }
        }
        Ok(ids)
    }

    /// Discover all items matching `predicate` and hand them to `f` one by one.
    ///
    /// `f` is expected to contain its own failures and report them through
    /// [`ItemOutcome::Failed`]. Cancelling `cancel` stops the run at the next
    /// wait; the report then covers the work done so far.
    pub async fn execute<F, Fut>(
        &self,
        session: &dyn ContentSession,
        predicate: &Predicate,
        cancel: &CancellationToken,
        mut f: F,
    ) -> Result<ExecutionReport, ExecutorError>
    where
        F: FnMut(Item) -> Fut,
        Fut: Future<Output = ItemOutcome>,
    {
        let ids = self.discover(session, predicate).await?;
        let mut report = ExecutionReport {
            total: ids.len(),
            ..Default::default()
        };
        tracing::info!(
            query = %predicate,
            total = report.total,
            batch_size = self.batch_size,
            "Discovered items to process"
        );

        let mut paused_at = 0usize;
        for id in ids {
            if cancel.is_cancelled() {
                report.interrupted = true;
                break;
            }

            // A skipped item leaves `processed` on the same multiple; pause once per multiple.
            if self.batch_size > 0
                && report.processed > 0
                && report.processed % self.batch_size as usize == 0
                && paused_at != report.processed
            {
                paused_at = report.processed;
                report.batch_pauses += 1;
                tracing::debug!(
                    processed = report.processed,
                    delay_ms = self.batch_delay.as_millis() as u64,
                    "Batch complete, pausing"
                );
                if !wait(self.batch_delay, cancel).await {
                    report.interrupted = true;
                    break;
                }
            }

            let item = match session.item(id).await {
                Ok(Some(item)) => item,
                Ok(None) => {
                    tracing::debug!(item_id = %id, "Item no longer exists, skipping");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::error!(item_id = %id, error = %e, "Failed to fetch item, skipping");
                    report.skipped += 1;
                    continue;
                }
            };

            report.processed += 1;
            if f(item).await == ItemOutcome::Failed {
                report.failed += 1;
            }

            if let Some(delay) = self.item_delay
                && !wait(delay, cancel).await
            {
                report.interrupted = true;
                break;
            }
        }

        if report.interrupted {
            tracing::info!(
                processed = report.processed,
                total = report.total,
                "Run interrupted, stopping"
            );
        }
        Ok(report)
    }
}

/// Sleep for `delay` unless cancelled first. Returns `false` when cancelled.
async fn wait(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
