//! Single-item history tasks.
//!
//! A task is built for one item, validated on construction and consumed by
//! `execute`, so an instance can never run twice. Tasks stage their changes
//! on the session; committing is left to the caller, except where a task
//! documents its own intermediate save.

mod cleanup;
mod delete;
mod truncate;

pub use cleanup::{CleanupSummary, RevisionCleanupTask};
pub use delete::{DeleteItemTask, DeleteOutcome};
use thiserror::Error;
pub use truncate::TruncateHistoryTask;

use crate::store::{CONTENT_ROOT, Item, StoreError};

#[derive(Debug, Error)]
pub enum TaskError {
    /// The item does not qualify for history tasks.
    #[error("Illegal item: {0}")]
    IllegalItem(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type TaskResult<T> = Result<T, TaskError>;

/// Check that `item` is a versionable content item and not configuration.
pub fn validate_item(item: &Item) -> TaskResult<()> {
    if !item.versionable {
        return Err(TaskError::IllegalItem(format!(
            "{} is not versionable",
            item.path
        )));
    }
    if !item.path.starts_with(&format!("{CONTENT_ROOT}/")) {
        return Err(TaskError::IllegalItem(format!(
            "{} is not under {CONTENT_ROOT}/",
            item.path
        )));
    }
    if item.content_type.starts_with("hst:")
        || item.path.starts_with("/hippo:configuration/")
        || item.path == "/hippo:namespaces"
        || item.path.starts_with("/hippo:namespaces/")
    {
        return Err(TaskError::IllegalItem(format!(
            "{} is a configuration item",
            item.path
        )));
    }
    Ok(())
}
