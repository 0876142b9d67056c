use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::CleaningStrategy;
use crate::{
    policy::PolicyTable,
    store::{ContentSession, Item, Predicate, PredicateFilter},
    tasks::{RevisionCleanupTask, TaskResult},
};

/// Prune revisions of every versionable item below a root, each by the
/// policy of its content type.
pub struct RevisionsStrategy {
    cleanup_root: Uuid,
    policies: Arc<PolicyTable>,
}

impl RevisionsStrategy {
    pub fn new(cleanup_root: Uuid, policies: Arc<PolicyTable>) -> Self {
        Self {
            cleanup_root,
            policies,
        }
    }
}

#[async_trait]
impl CleaningStrategy for RevisionsStrategy {
    const NAME: &'static str = "revisions";

    fn build_predicate(&self, _now: DateTime<Utc>) -> Predicate {
        Predicate::new(PredicateFilter::Versionable {
            under: self.cleanup_root,
        })
        .ordered_by_identifier()
    }

    async fn clean_item(
        &self,
        session: &dyn ContentSession,
        item: Item,
        now: DateTime<Utc>,
    ) -> TaskResult<()> {
        let policy = self.policies.policy_for(&item.content_type);
        tracing::info!(
            content_type = %item.content_type,
            path = %item.path,
            "Cleanup old revisions"
        );
        let summary = RevisionCleanupTask::new(session, item, policy, now)?
            .execute()
            .await?;
        tracing::debug!(aged = summary.aged, surplus = summary.surplus, "Revisions removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::{
        policy::RetentionPolicy,
        query::BatchedQueryExecutor,
        services::CleaningService,
        store::memory::{MemoryRepository, fixtures},
    };

    #[test]
    fn test_predicate_is_ordered_and_rooted() {
        let root = Uuid::new_v4();
        let strategy = RevisionsStrategy::new(root, Arc::new(PolicyTable::default()));
        let predicate = strategy.build_predicate(Utc::now());
        assert!(predicate.is_ordered());
        assert_eq!(predicate.filter, PredicateFilter::Versionable { under: root });
    }

    #[tokio::test]
    async fn test_policy_per_content_type() {
        let repo = MemoryRepository::new();
        let now = Utc::now();
        let news = fixtures::document(&repo, "/content/documents", "news", "ns:news");
        let page = fixtures::document(&repo, "/content/documents", "page", "ns:page");
        fixtures::add_revisions(&repo, news.preview.id, now, &[40, 20, 5, 1]);
        fixtures::add_revisions(&repo, page.preview.id, now, &[40, 20, 5, 1]);
        let root = fixtures::folder(&repo, "/content/documents");

        let policies = PolicyTable::new(RetentionPolicy::new(30, -1))
            .with_type("ns:page", RetentionPolicy::new(-1, 1));
        let service = CleaningService::new(
            RevisionsStrategy::new(root.id, Arc::new(policies)),
            BatchedQueryExecutor::new(0, Duration::ZERO),
        );
        service
            .clean_nodes_at(&repo.session(), now, &CancellationToken::new())
            .await
            .unwrap();

        // the 40-day revision is past the default age
        let names: Vec<_> = repo
            .history(news.preview.id)
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, ["jcr:rootVersion", "1.2", "1.3", "1.4"]);

        // only the newest one survives the page count limit
        let names: Vec<_> = repo
            .history(page.preview.id)
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, ["jcr:rootVersion", "1.4"]);
    }

    #[tokio::test]
    async fn test_items_outside_root_untouched() {
        let repo = MemoryRepository::new();
        let now = Utc::now();
        let inside = fixtures::document(&repo, "/content/documents/news", "a", "ns:doc");
        let outside = fixtures::document(&repo, "/content/documents/events", "b", "ns:doc");
        fixtures::add_revisions(&repo, inside.preview.id, now, &[2, 1]);
        fixtures::add_revisions(&repo, outside.preview.id, now, &[2, 1]);
        let root = fixtures::folder(&repo, "/content/documents/news");

        let service = CleaningService::new(
            RevisionsStrategy::new(
                root.id,
                Arc::new(PolicyTable::new(RetentionPolicy::new(-1, 0))),
            ),
            BatchedQueryExecutor::new(0, Duration::ZERO),
        );
        let report = service
            .clean_nodes_at(&repo.session(), now, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.total, 1);
        assert_eq!(repo.history(inside.preview.id).len(), 1);
        assert_eq!(repo.history(outside.preview.id).len(), 3);
    }
}
