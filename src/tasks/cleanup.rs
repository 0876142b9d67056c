use chrono::{DateTime, Utc};

use super::{TaskResult, validate_item};
use crate::{
    observability::metrics,
    policy::RetentionPolicy,
    retention::{DeletionReason, select_revisions_to_delete},
    store::{ContentSession, Item},
};

/// Revisions removed by one cleanup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    pub aged: usize,
    pub surplus: usize,
}

impl CleanupSummary {
    pub fn total(&self) -> usize {
        self.aged + self.surplus
    }
}

/// Remove the revisions of one item that its retention policy no longer keeps.
pub struct RevisionCleanupTask<'a> {
    session: &'a dyn ContentSession,
    item: Item,
    policy: RetentionPolicy,
    now: DateTime<Utc>,
}

impl<'a> RevisionCleanupTask<'a> {
    pub fn new(
        session: &'a dyn ContentSession,
        item: Item,
        policy: RetentionPolicy,
        now: DateTime<Utc>,
    ) -> TaskResult<Self> {
        validate_item(&item)?;
        Ok(Self {
            session,
            item,
            policy,
            now,
        })
    }

    pub async fn execute(self) -> TaskResult<CleanupSummary> {
        let mut summary = CleanupSummary::default();
        if self.policy.is_unlimited() {
            return Ok(summary);
        }

        let history = self.session.revision_history(self.item.id).await?;
        for deletion in select_revisions_to_delete(&history, &self.policy, self.now) {
            let revision = &deletion.revision;
            tracing::info!(
                revision = %revision.name,
                created = %revision.created.to_rfc3339(),
                path = %self.item.path,
                reason = deletion.reason.as_str(),
                "Removing revision"
            );
            self.session
                .remove_revision(self.item.id, &revision.name)
                .await?;
            match deletion.reason {
                DeletionReason::Aged => summary.aged += 1,
                DeletionReason::Surplus => summary.surplus += 1,
            }
        }

        metrics::record_revisions_deleted(DeletionReason::Aged.as_str(), summary.aged as u64);
        metrics::record_revisions_deleted(DeletionReason::Surplus.as_str(), summary.surplus as u64);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::{
        store::memory::{MemoryRepository, fixtures},
        tasks::TaskError,
    };

    #[tokio::test]
    async fn test_cleanup_removes_aged_then_surplus() {
        let repo = MemoryRepository::new();
        let now = Utc::now();
        let doc = fixtures::document(&repo, "/content/documents", "a", "ns:doc");
        fixtures::add_revisions(&repo, doc.preview.id, now, &[40, 20, 10, 5, 1]);
        let session = repo.session();

        let summary = RevisionCleanupTask::new(&session, doc.preview.clone(), RetentionPolicy::new(30, 2), now)
            .unwrap()
            .execute()
            .await
            .unwrap();
        assert_eq!(summary, CleanupSummary { aged: 1, surplus: 2 });

        session.save().await.unwrap();
        let remaining: Vec<String> = repo
            .history(doc.preview.id)
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(remaining, vec!["jcr:rootVersion", "1.4", "1.5"]);
    }

    #[tokio::test]
    async fn test_unlimited_policy_reads_nothing() {
        let repo = MemoryRepository::new();
        let doc = fixtures::document(&repo, "/content/documents", "a", "ns:doc");
        // an unknown id has no history, so reading it would fail
        let mut item = doc.preview.clone();
        item.id = uuid::Uuid::new_v4();
        let session = repo.session();

        let summary = RevisionCleanupTask::new(&session, item, RetentionPolicy::UNLIMITED, Utc::now())
            .unwrap()
            .execute()
            .await
            .unwrap();
        assert_eq!(summary.total(), 0);
    }

    #[tokio::test]
    async fn test_labeled_revisions_survive() {
        let repo = MemoryRepository::new();
        let now = Utc::now();
        let doc = fixtures::document(&repo, "/content/documents", "a", "ns:doc");
        let mut history = repo.history(doc.preview.id);
        history.push(crate::store::Revision::new("1.0", now - TimeDelta::days(90)).with_label("golden"));
        history.push(crate::store::Revision::new("1.1", now - TimeDelta::days(80)));
        repo.set_history(doc.preview.id, history);
        let session = repo.session();

        let summary = RevisionCleanupTask::new(&session, doc.preview.clone(), RetentionPolicy::new(0, 0), now)
            .unwrap()
            .execute()
            .await
            .unwrap();
        assert_eq!(summary.total(), 1);
        session.save().await.unwrap();
        assert_eq!(repo.history(doc.preview.id).len(), 2);
    }

    #[tokio::test]
    async fn test_construction_fails_closed() {
        let repo = MemoryRepository::new();
        let doc = fixtures::document(&repo, "/content/documents", "a", "ns:doc");
        let session = repo.session();
        let result = RevisionCleanupTask::new(&session, doc.handle.clone(), RetentionPolicy::new(1, 1), Utc::now());
        assert!(matches!(result, Err(TaskError::IllegalItem(_))));
    }
}
