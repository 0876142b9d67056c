//! Event-driven history cleanup.
//!
//! [`HistoryCleanerListener`] reacts to single workflow events: a publish
//! prunes the history of the published document by its type's policy, a
//! delete truncates the history when the type asks for it. [`CleanerDaemon`]
//! owns the reconfigurable policy table and feeds events from an
//! [`EventBus`](crate::events::EventBus) subscription to the listener.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::{
    config::attributes::Attributes,
    events::{ACTION_DELETE, ACTION_PUBLISH, LifecycleEvent},
    observability::metrics,
    policy::{PolicyHandle, PolicyTable, RetentionPolicy},
    store::{
        ContentSession, Item, Repository, StoreResult,
        tree::{find_handle, find_preview_variant},
    },
    tasks::{CleanupSummary, RevisionCleanupTask, TaskResult, TruncateHistoryTask},
};

const JOB_NAME: &str = "listener";

/// What handling one event ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not a workflow event, or an action the cleaner does not react to.
    Ignored,
    SubjectNotFound,
    /// No revisioned variant could be resolved for the subject.
    NoVariant,
    Cleaned(CleanupSummary),
    /// The type does not truncate on delete.
    TruncateDisabled,
    /// Number of revisions removed.
    Truncated(usize),
    Failed(String),
}

/// Handles workflow events one at a time, each in its own session.
pub struct HistoryCleanerListener {
    repository: Arc<dyn Repository>,
    policies: PolicyHandle,
}

impl HistoryCleanerListener {
    pub fn new(repository: Arc<dyn Repository>, policies: PolicyHandle) -> Self {
        Self {
            repository,
            policies,
        }
    }

    pub async fn handle_event(&self, event: &LifecycleEvent) -> DispatchOutcome {
        if !event.is_workflow() {
            return DispatchOutcome::Ignored;
        }
        if event.action != ACTION_PUBLISH && event.action != ACTION_DELETE {
            return DispatchOutcome::Ignored;
        }

        let policies = self.policies.load();
        let session = match self.repository.login().await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(
                    subject_id = %event.subject_id,
                    path = %event.subject_path,
                    error = %e,
                    "Failed to open session for event"
                );
                metrics::record_items_processed(JOB_NAME, "failed", 1);
                return DispatchOutcome::Failed(e.to_string());
            }
        };

        match self.dispatch(session.as_ref(), event, &policies).await {
            Ok(outcome) => {
                let label = match &outcome {
                    DispatchOutcome::Cleaned(_) | DispatchOutcome::Truncated(_) => "cleaned",
                    _ => "skipped",
                };
                metrics::record_items_processed(JOB_NAME, label, 1);
                outcome
            }
            Err(e) => {
                tracing::error!(
                    subject_id = %event.subject_id,
                    path = %event.subject_path,
                    action = %event.action,
                    error = %e,
                    "Failed to clean revision history for document"
                );
                if let Err(e) = session.discard().await {
                    tracing::error!(error = %e, "Failed to discard session changes");
                }
                metrics::record_items_processed(JOB_NAME, "failed", 1);
                DispatchOutcome::Failed(e.to_string())
            }
        }
    }

    async fn dispatch(
        &self,
        session: &dyn ContentSession,
        event: &LifecycleEvent,
        policies: &PolicyTable,
    ) -> TaskResult<DispatchOutcome> {
        let Some(subject) = session.item(event.subject_id).await? else {
            tracing::warn!(subject_id = %event.subject_id, path = %event.subject_path, "Event subject not found");
            return Ok(DispatchOutcome::SubjectNotFound);
        };

        if event.action == ACTION_PUBLISH {
            let Some(preview) = find_preview_variant(session, &subject).await? else {
                tracing::warn!(path = %subject.path, "No preview variant found for published document");
                return Ok(DispatchOutcome::NoVariant);
            };
            let policy = policy_for_event(policies, event, &preview);
            let summary = RevisionCleanupTask::new(session, preview, policy, Utc::now())?
                .execute()
                .await?;
            session.save().await?;
            return Ok(DispatchOutcome::Cleaned(summary));
        }

        let Some(variant) = find_history_variant(session, &subject).await? else {
            tracing::warn!(path = %subject.path, "No revisioned variant found for deleted document");
            return Ok(DispatchOutcome::NoVariant);
        };
        let policy = policy_for_event(policies, event, &variant);
        if !policy.truncate_on_delete {
            return Ok(DispatchOutcome::TruncateDisabled);
        }
        tracing::info!(path = %variant.path, content_type = %variant.content_type, "Truncating history of deleted document");
        let removed = TruncateHistoryTask::new(session, variant)?.execute().await?;
        session.save().await?;
        Ok(DispatchOutcome::Truncated(removed))
    }
}

/// The event's document type decides; the variant's own type is used when
/// the event does not carry one.
fn policy_for_event(policies: &PolicyTable, event: &LifecycleEvent, variant: &Item) -> RetentionPolicy {
    if event.content_type.is_empty() {
        policies.policy_for(&variant.content_type)
    } else {
        policies.policy_for(&event.content_type)
    }
}

/// The variant carrying the history of a deleted document. After the delete
/// transition it no longer has a publication state, so any versionable
/// variant named like its handle qualifies.
async fn find_history_variant(
    session: &dyn ContentSession,
    subject: &Item,
) -> StoreResult<Option<Item>> {
    if subject.versionable {
        return Ok(Some(subject.clone()));
    }
    if let Some(preview) = find_preview_variant(session, subject).await? {
        return Ok(Some(preview));
    }
    let Some(handle) = find_handle(session, subject).await? else {
        return Ok(None);
    };
    Ok(session
        .children(handle.id)
        .await?
        .into_iter()
        .find(|variant| variant.name == handle.name && variant.versionable))
}

/// Long-running consumer of lifecycle events with a reconfigurable policy table.
pub struct CleanerDaemon {
    listener: HistoryCleanerListener,
    policies: PolicyHandle,
}

impl CleanerDaemon {
    pub fn new(repository: Arc<dyn Repository>, attrs: &Attributes) -> Self {
        let policies = PolicyHandle::new(PolicyTable::resolve(attrs));
        Self {
            listener: HistoryCleanerListener::new(repository, policies.clone()),
            policies,
        }
    }

    /// Resolve `attrs` into a new policy table and swap it in. Events already
    /// being handled finish with the table they started with.
    pub fn configure(&self, attrs: &Attributes) {
        let table = PolicyTable::resolve(attrs);
        tracing::info!(
            default = ?table.default_policy(),
            overridden_types = ?table.overridden_types(),
            "Reconfigured retention policies"
        );
        self.policies.store(table);
    }

    pub fn policies(&self) -> Arc<PolicyTable> {
        self.policies.load()
    }

    pub fn listener(&self) -> &HistoryCleanerListener {
        &self.listener
    }

    /// Handle events one by one until cancelled or the bus is closed.
    pub async fn run(&self, mut rx: broadcast::Receiver<LifecycleEvent>, cancel: CancellationToken) {
        tracing::info!("History cleaner listener started");
        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                received = rx.recv() => received,
            };
            match received {
                Ok(event) => {
                    let outcome = self.listener.handle_event(&event).await;
                    tracing::debug!(
                        subject_id = %event.subject_id,
                        action = %event.action,
                        outcome = ?outcome,
                        "Handled lifecycle event"
                    );
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Listener lagged behind, events were dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        tracing::info!("History cleaner listener stopped");
    }
}
