use super::{TaskResult, validate_item};
use crate::{
    observability::metrics,
    store::{ContentSession, Item},
};

/// Discard the whole revision history of an item, keeping only the root.
///
/// For an item in the attic the containing handle is removed and saved
/// first, so the revisions are no longer referenced when they are dropped.
/// A failure later on leaves the handle removed; running the task again on
/// the same history is safe.
pub struct TruncateHistoryTask<'a> {
    session: &'a dyn ContentSession,
    item: Item,
}

impl<'a> TruncateHistoryTask<'a> {
    pub fn new(session: &'a dyn ContentSession, item: Item) -> TaskResult<Self> {
        validate_item(&item)?;
        Ok(Self { session, item })
    }

    /// Returns the number of revisions removed.
    pub async fn execute(self) -> TaskResult<usize> {
        let history = self.session.revision_history(self.item.id).await?;

        if self.item.in_attic() {
            match self.item.parent {
                Some(handle) => {
                    tracing::debug!(
                        path = %self.item.path,
                        handle_id = %handle,
                        "Removing attic handle before truncating"
                    );
                    self.session.remove_item(handle).await?;
                    self.session.save().await?;
                }
                None => {
                    tracing::warn!(path = %self.item.path, "Attic item has no parent handle");
                }
            }
        }

        let mut removed = 0usize;
        for revision in history.iter().filter(|r| !r.is_root()) {
            tracing::info!(
                revision = %revision.name,
                created = %revision.created.to_rfc3339(),
                path = %self.item.path,
                "Truncating revision"
            );
            self.session
                .remove_revision(self.item.id, &revision.name)
                .await?;
            removed += 1;
        }

        metrics::record_revisions_deleted("truncated", removed as u64);
        Ok(removed)
    }
}
