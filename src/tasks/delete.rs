use super::{TaskError, TaskResult, validate_item};
use crate::store::{
    ContentSession, DocumentWorkflow, Item, WorkflowError, item_path, tree::find_handle,
    workflow::DELETE_HINT,
};

/// What a delete attempt ended with. Only [`DeleteOutcome::Deleted`] staged changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NoHandle,
    WorkflowUnavailable,
    /// The workflow did not grant the delete transition.
    NotAllowed,
    WorkflowFailed(String),
}

/// Delete an item's document through its workflow.
pub struct DeleteItemTask<'a> {
    session: &'a dyn ContentSession,
    workflow: &'a dyn DocumentWorkflow,
    item: Item,
}

impl<'a> DeleteItemTask<'a> {
    pub fn new(
        session: &'a dyn ContentSession,
        workflow: &'a dyn DocumentWorkflow,
        item: Item,
    ) -> TaskResult<Self> {
        validate_item(&item)?;
        Ok(Self {
            session,
            workflow,
            item,
        })
    }

    /// Workflow refusals and failures are logged and reported in the
    /// outcome; only store failures are returned as errors.
    pub async fn execute(self) -> TaskResult<DeleteOutcome> {
        let Some(handle) = find_handle(self.session, &self.item).await? else {
            tracing::warn!(path = %self.item.path, "No handle found for item");
            return Ok(DeleteOutcome::NoHandle);
        };

        let hints = match self.workflow.hints(self.session, &handle).await {
            Ok(Some(hints)) => hints,
            Ok(None) => {
                tracing::warn!(path = %self.item.path, "Document workflow is not available for item");
                return Ok(DeleteOutcome::WorkflowUnavailable);
            }
            Err(e) => return self.workflow_failure(&handle, e).await,
        };

        if hints.get(DELETE_HINT).copied() != Some(true) {
            let hints = hints
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(", ");
            tracing::error!(path = %handle.path, hints = %hints, "Not allowed to delete document");
            return Ok(DeleteOutcome::NotAllowed);
        }

        tracing::info!(path = %handle.path, "Deleting document");
        match self.workflow.delete(self.session, &handle).await {
            Ok(()) => Ok(DeleteOutcome::Deleted),
            Err(e) => self.workflow_failure(&handle, e).await,
        }
    }

    async fn workflow_failure(&self, handle: &Item, error: WorkflowError) -> TaskResult<DeleteOutcome> {
        match error {
            WorkflowError::Store(e) => Err(TaskError::Store(e)),
            other => {
                let path = item_path(self.session, handle.id).await;
                tracing::warn!(
                    path = %path,
                    error = %other,
                    "Error in workflow, unable to delete the document"
                );
                Ok(DeleteOutcome::WorkflowFailed(other.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::store::{
        Hints, ItemKind, VariantState, workflow::BasicDocumentWorkflow,
        memory::{MemoryRepository, fixtures},
    };

    /// Workflow that is never available.
    struct NoWorkflow;

    #[async_trait]
    impl DocumentWorkflow for NoWorkflow {
        async fn hints(
            &self,
            _session: &dyn ContentSession,
            _handle: &Item,
        ) -> Result<Option<Hints>, WorkflowError> {
            Ok(None)
        }

        async fn delete(&self, _session: &dyn ContentSession, _handle: &Item) -> Result<(), WorkflowError> {
            unreachable!("delete without hints")
        }
    }

    /// Workflow that grants delete and then fails it.
    struct BrokenWorkflow;

    #[async_trait]
    impl DocumentWorkflow for BrokenWorkflow {
        async fn hints(
            &self,
            _session: &dyn ContentSession,
            _handle: &Item,
        ) -> Result<Option<Hints>, WorkflowError> {
            Ok(Some(Hints::from([(DELETE_HINT.to_string(), true)])))
        }

        async fn delete(&self, _session: &dyn ContentSession, _handle: &Item) -> Result<(), WorkflowError> {
            Err(WorkflowError::Workflow("document is locked".into()))
        }
    }

    #[tokio::test]
    async fn test_deletes_unpublished_document() {
        let repo = MemoryRepository::new();
        let doc = fixtures::document(&repo, "/content/documents", "a", "ns:doc");
        let session = repo.session();

        let outcome = DeleteItemTask::new(&session, &BasicDocumentWorkflow, doc.preview.clone())
            .unwrap()
            .execute()
            .await
            .unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted);

        let variant = session.item(doc.preview.id).await.unwrap().unwrap();
        assert_eq!(variant.kind, ItemKind::Deleted);
        assert!(variant.in_attic());
    }

    #[tokio::test]
    async fn test_denied_hint_is_not_an_error() {
        let repo = MemoryRepository::new();
        let doc = fixtures::document(&repo, "/content/documents", "a", "ns:doc");
        fixtures::add_variant(&repo, &doc.handle, VariantState::Published);
        let session = repo.session();

        let outcome = DeleteItemTask::new(&session, &BasicDocumentWorkflow, doc.preview.clone())
            .unwrap()
            .execute()
            .await
            .unwrap();
        assert_eq!(outcome, DeleteOutcome::NotAllowed);
        assert_eq!(session.pending_changes(), 0);
    }

    #[tokio::test]
    async fn test_workflow_unavailable() {
        let repo = MemoryRepository::new();
        let doc = fixtures::document(&repo, "/content/documents", "a", "ns:doc");
        let session = repo.session();

        let outcome = DeleteItemTask::new(&session, &NoWorkflow, doc.preview.clone())
            .unwrap()
            .execute()
            .await
            .unwrap();
        assert_eq!(outcome, DeleteOutcome::WorkflowUnavailable);
    }

    #[tokio::test]
    async fn test_workflow_failure_is_reported() {
        let repo = MemoryRepository::new();
        let doc = fixtures::document(&repo, "/content/documents", "a", "ns:doc");
        let session = repo.session();

        let outcome = DeleteItemTask::new(&session, &BrokenWorkflow, doc.preview.clone())
            .unwrap()
            .execute()
            .await
            .unwrap();
        assert!(matches!(outcome, DeleteOutcome::WorkflowFailed(msg) if msg.contains("locked")));
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn test_workflow_failure_future_is_send() {
        let repo = MemoryRepository::new();
        let doc = fixtures::document(&repo, "/content/documents", "a", "ns:doc");
        let session = repo.session();
        let task = DeleteItemTask::new(&session, &BrokenWorkflow, doc.preview.clone()).unwrap();
        assert_send(&task.execute());
    }

    #[tokio::test]
    async fn test_orphan_document_has_no_handle() {
        let repo = MemoryRepository::new();
        let doc = fixtures::document(&repo, "/content/documents", "a", "ns:doc");
        let mut orphan = doc.preview.clone();
        orphan.parent = None;
        let session = repo.session();

        let outcome = DeleteItemTask::new(&session, &BasicDocumentWorkflow, orphan)
            .unwrap()
            .execute()
            .await
            .unwrap();
        assert_eq!(outcome, DeleteOutcome::NoHandle);
    }
}
