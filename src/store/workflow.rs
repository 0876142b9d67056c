//! Document workflow seam used by the unpublished-item expiry pass.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;

use super::{
    ATTIC_ROOT, CONTENT_ROOT, ContentSession, Item, ItemKind, StoreError, VariantState,
};

/// Hint name that grants the delete transition.
pub const DELETE_HINT: &str = "delete";

/// Actions the workflow currently allows on a handle.
pub type Hints = BTreeMap<String, bool>;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Transition '{0}' is not allowed")]
    NotAllowed(String),

    #[error("Workflow error: {0}")]
    Workflow(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Publish/unpublish/delete transitions of a document handle.
#[async_trait]
pub trait DocumentWorkflow: Send + Sync {
    /// Hints for the handle, or `None` when no document workflow is available for it.
    async fn hints(
        &self,
        session: &dyn ContentSession,
        handle: &Item,
    ) -> Result<Option<Hints>, WorkflowError>;

    /// Move the document into the deleted-items holding area. Changes are
    /// staged on `session`.
    async fn delete(&self, session: &dyn ContentSession, handle: &Item)
    -> Result<(), WorkflowError>;
}

/// Minimal delete transition over any [`ContentSession`].
///
/// Deleting keeps the preview variant, drops the others, marks the survivor as
/// deleted and relocates the handle under the attic.
#[derive(Debug, Clone, Default)]
pub struct BasicDocumentWorkflow;

impl BasicDocumentWorkflow {
    fn attic_path(path: &str) -> String {
        let relative = path.strip_prefix(CONTENT_ROOT).unwrap_or(path);
        format!("{ATTIC_ROOT}{relative}")
    }
}

#[async_trait]
impl DocumentWorkflow for BasicDocumentWorkflow {
    async fn hints(
        &self,
        session: &dyn ContentSession,
        handle: &Item,
    ) -> Result<Option<Hints>, WorkflowError> {
        if handle.kind != ItemKind::Handle {
            return Ok(None);
        }
        let variants = session.children(handle.id).await?;
        let published = variants
            .iter()
            .any(|v| v.variant_state == Some(VariantState::Published));
        let mut hints = Hints::new();
        hints.insert(DELETE_HINT.to_string(), !published && !handle.in_attic());
        hints.insert("publish".to_string(), !handle.in_attic());
        Ok(Some(hints))
    }

    async fn delete(
        &self,
        session: &dyn ContentSession,
        handle: &Item,
    ) -> Result<(), WorkflowError> {
        let allowed = self
            .hints(session, handle)
            .await?
            .and_then(|hints| hints.get(DELETE_HINT).copied())
            .unwrap_or(false);
        if !allowed {
            return Err(WorkflowError::NotAllowed(DELETE_HINT.to_string()));
        }

        let variants = session.children(handle.id).await?;
        let survivor = variants
            .iter()
            .find(|v| v.variant_state == Some(VariantState::Unpublished))
            .or_else(|| variants.first())
            .map(|v| v.id);

        for variant in &variants {
            if Some(variant.id) != survivor {
                session.remove_item(variant.id).await?;
            }
        }

        let mut moved = handle.clone();
        moved.path = Self::attic_path(&handle.path);
        session.put_item(moved).await?;

        if let Some(id) = survivor
            && let Some(mut variant) = session.item(id).await?
        {
            variant.kind = ItemKind::Deleted;
            variant.variant_state = None;
            variant.state_summary = None;
            variant.deleted_at = Some(Utc::now());
            session.put_item(variant).await?;
        }
        Ok(())
    }
}
