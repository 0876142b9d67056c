//! In-process content store backed by JSON snapshots.
//!
//! A [`MemoryRepository`] holds the committed state. Every [`MemorySession`]
//! works on a private copy of that state and records a change log; `save`
//! replays the log onto the committed state and refreshes the copy, `discard`
//! throws both away.

use std::{
    collections::BTreeMap,
    path::Path,
    sync::Arc,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    ContentSession, Item, Predicate, QueryPage, Repository, Revision, StoreError, StoreResult,
};

/// Committed content of the store: items plus their revision histories.
///
/// Histories are keyed by item identifier and outlive the item itself, like
/// a version storage that is separate from the content tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub items: BTreeMap<Uuid, Item>,
    #[serde(default)]
    pub histories: BTreeMap<Uuid, Vec<Revision>>,
}

impl StoreSnapshot {
    /// Identifiers of the item and all of its ancestors, nearest first.
    fn lineage(&self, id: Uuid) -> Vec<Uuid> {
        let mut lineage = vec![id];
        let mut current = self.items.get(&id).and_then(|item| item.parent);
        while let Some(parent) = current {
            // parent links are data; a cycle must not hang a query
            if lineage.contains(&parent) || lineage.len() > self.items.len() {
                break;
            }
            lineage.push(parent);
            current = self.items.get(&parent).and_then(|item| item.parent);
        }
        lineage
    }

    fn children(&self, id: Uuid) -> Vec<Item> {
        self.items
            .values()
            .filter(|item| item.parent == Some(id))
            .cloned()
            .collect()
    }

    fn descendants(&self, id: Uuid) -> Vec<Uuid> {
        let mut found = Vec::new();
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            for child in self.items.values().filter(|item| item.parent == Some(next)) {
                if !found.contains(&child.id) && child.id != id {
                    found.push(child.id);
                    pending.push(child.id);
                }
            }
        }
        found
    }

    fn query(&self, predicate: &Predicate) -> Vec<Uuid> {
        // BTreeMap iteration is identifier order, which doubles as the
        // ordered-by-identifier result
        self.items
            .values()
            .filter(|item| predicate.matches(item, &self.lineage(item.id)))
            .map(|item| item.id)
            .collect()
    }

    fn put(&mut self, item: Item) {
        if let Some(existing) = self.items.get(&item.id)
            && existing.path != item.path
        {
            let old_prefix = format!("{}/", existing.path);
            let new_prefix = format!("{}/", item.path);
            for id in self.descendants(item.id) {
                if let Some(child) = self.items.get_mut(&id)
                    && let Some(rest) = child.path.strip_prefix(&old_prefix)
                {
                    child.path = format!("{new_prefix}{rest}");
                }
            }
        }
        self.items.insert(item.id, item);
    }

    fn remove(&mut self, id: Uuid) -> StoreResult<()> {
        if !self.items.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        for child in self.descendants(id) {
            self.items.remove(&child);
        }
        self.items.remove(&id);
        Ok(())
    }

    fn remove_revision(&mut self, id: Uuid, revision: &str) -> StoreResult<()> {
        let not_found = || StoreError::RevisionNotFound {
            item: id,
            revision: revision.to_string(),
        };
        let history = self.histories.get_mut(&id).ok_or_else(not_found)?;
        let position = history
            .iter()
            .position(|r| r.name == revision)
            .ok_or_else(not_found)?;
        if history[position].is_root() {
            return Err(StoreError::Backend(format!(
                "root revision of {id} cannot be removed"
            )));
        }
        history.remove(position);
        Ok(())
    }

    fn apply(&mut self, change: &Change) -> StoreResult<()> {
        match change {
            Change::Put(item) => {
                self.put(item.clone());
                Ok(())
            }
            Change::Remove(id) => self.remove(*id),
            Change::RemoveRevision { item, revision } => self.remove_revision(*item, revision),
        }
    }
}

/// A staged mutation.
#[derive(Debug, Clone)]
enum Change {
    Put(Item),
    Remove(Uuid),
    RemoveRevision { item: Uuid, revision: String },
}

/// Shared committed state. Cloning yields another handle to the same store.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    committed: Arc<Mutex<StoreSnapshot>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            committed: Arc::new(Mutex::new(snapshot)),
        }
    }

    /// Load a snapshot file written by [`persist`](Self::persist).
    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let snapshot: StoreSnapshot = serde_json::from_str(&content)?;
        tracing::debug!(
            path = %path.as_ref().display(),
            items = snapshot.items.len(),
            histories = snapshot.histories.len(),
            "Loaded store snapshot"
        );
        Ok(Self::from_snapshot(snapshot))
    }

    pub fn persist(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        let json = serde_json::to_string_pretty(&*self.committed.lock())?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Copy of the committed state.
    pub fn snapshot(&self) -> StoreSnapshot {
        self.committed.lock().clone()
    }

    /// Insert an item directly into the committed state.
    pub fn insert_item(&self, item: Item) {
        self.committed.lock().put(item);
    }

    /// Replace the revision history of an item in the committed state.
    pub fn set_history(&self, id: Uuid, revisions: Vec<Revision>) {
        self.committed.lock().histories.insert(id, revisions);
    }

    pub fn history(&self, id: Uuid) -> Vec<Revision> {
        self.committed
            .lock()
            .histories
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn session(&self) -> MemorySession {
        MemorySession {
            repo: self.clone(),
            state: Mutex::new(SessionState {
                view: self.snapshot(),
                changes: Vec::new(),
            }),
        }
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn login(&self) -> StoreResult<Arc<dyn ContentSession>> {
        Ok(Arc::new(self.session()))
    }
}

#[derive(Debug)]
struct SessionState {
    view: StoreSnapshot,
    changes: Vec<Change>,
}

#[derive(Debug)]
pub struct MemorySession {
    repo: MemoryRepository,
    state: Mutex<SessionState>,
}

impl MemorySession {
    /// Number of staged, unsaved changes.
    pub fn pending_changes(&self) -> usize {
        self.state.lock().changes.len()
    }

    fn stage(&self, change: Change) -> StoreResult<()> {
        let mut state = self.state.lock();
        state.view.apply(&change)?;
        state.changes.push(change);
        Ok(())
    }
}

#[async_trait]
impl ContentSession for MemorySession {
    async fn query(
        &self,
        predicate: &Predicate,
        offset: u64,
        limit: Option<u64>,
    ) -> StoreResult<QueryPage> {
        let matches = self.state.lock().view.query(predicate);
        let total_size = matches.len() as u64;
        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        let ids = matches
            .into_iter()
            .skip(offset)
            .take(limit.map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX)))
            .collect();
        Ok(QueryPage {
            ids,
            total_size: Some(total_size),
        })
    }

    async fn item(&self, id: Uuid) -> StoreResult<Option<Item>> {
        Ok(self.state.lock().view.items.get(&id).cloned())
    }

    async fn item_by_path(&self, path: &str) -> StoreResult<Option<Item>> {
        if !path.starts_with('/') {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        let path = path.trim_end_matches('/');
        Ok(self
            .state
            .lock()
            .view
            .items
            .values()
            .find(|item| item.path == path)
            .cloned())
    }

    async fn children(&self, id: Uuid) -> StoreResult<Vec<Item>> {
        Ok(self.state.lock().view.children(id))
    }

    async fn revision_history(&self, id: Uuid) -> StoreResult<Vec<Revision>> {
        self.state
            .lock()
            .view
            .histories
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn remove_revision(&self, id: Uuid, revision: &str) -> StoreResult<()> {
        self.stage(Change::RemoveRevision {
            item: id,
            revision: revision.to_string(),
        })
    }

    async fn put_item(&self, item: Item) -> StoreResult<()> {
        self.stage(Change::Put(item))
    }

    async fn remove_item(&self, id: Uuid) -> StoreResult<()> {
        self.stage(Change::Remove(id))
    }

    async fn save(&self) -> StoreResult<()> {
        let mut state = self.state.lock();
        let changes = std::mem::take(&mut state.changes);
        let mut committed = self.repo.committed.lock();
        for change in &changes {
            // another session may already have removed the target
            if let Err(e) = committed.apply(change) {
                tracing::debug!(error = %e, "Skipping stale change on save");
            }
        }
        state.view = committed.clone();
        Ok(())
    }

    async fn discard(&self) -> StoreResult<()> {
        let mut state = self.state.lock();
        state.changes.clear();
        state.view = self.repo.snapshot();
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::store::{ItemKind, PredicateFilter};

    #[tokio::test]
    async fn test_changes_invisible_until_save() {
        let repo = MemoryRepository::new();
        let doc = fixtures::document(&repo, "/content/documents", "a", "ns:doc");
        let session = repo.session();

        session.remove_item(doc.handle.id).await.unwrap();
        assert!(session.item(doc.handle.id).await.unwrap().is_none());
        assert!(repo.snapshot().items.contains_key(&doc.handle.id));
        assert_eq!(session.pending_changes(), 1);

        session.save().await.unwrap();
        assert!(!repo.snapshot().items.contains_key(&doc.handle.id));
        assert!(!repo.snapshot().items.contains_key(&doc.preview.id));
        assert_eq!(session.pending_changes(), 0);
    }

    #[tokio::test]
    async fn test_discard_restores_committed_state() {
        let repo = MemoryRepository::new();
        let doc = fixtures::document(&repo, "/content/documents", "a", "ns:doc");
        fixtures::add_revisions(&repo, doc.preview.id, Utc::now(), &[3]);
        let session = repo.session();

        session.remove_revision(doc.preview.id, "1.1").await.unwrap();
        assert_eq!(session.revision_history(doc.preview.id).await.unwrap().len(), 1);

        session.discard().await.unwrap();
        assert_eq!(session.revision_history(doc.preview.id).await.unwrap().len(), 2);
        assert_eq!(repo.history(doc.preview.id).len(), 2);
    }

    #[tokio::test]
    async fn test_root_revision_cannot_be_removed() {
        let repo = MemoryRepository::new();
        let doc = fixtures::document(&repo, "/content/documents", "a", "ns:doc");
        let session = repo.session();
        let err = session
            .remove_revision(doc.preview.id, crate::store::ROOT_REVISION)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        assert_eq!(session.pending_changes(), 0);
    }

    #[tokio::test]
    async fn test_query_pages_in_identifier_order() {
        let repo = MemoryRepository::new();
        let root = fixtures::folder(&repo, "/content");
        for i in 0..5 {
            fixtures::document(&repo, "/content/documents", &format!("d{i}"), "ns:doc");
        }
        let session = repo.session();
        let predicate =
            Predicate::new(PredicateFilter::Versionable { under: root.id }).ordered_by_identifier();

        let first = session.query(&predicate, 0, Some(3)).await.unwrap();
        let second = session.query(&predicate, 3, Some(3)).await.unwrap();
        assert_eq!(first.total_size, Some(5));
        assert_eq!(first.ids.len(), 3);
        assert_eq!(second.ids.len(), 2);

        let mut all = first.ids.clone();
        all.extend(second.ids);
        let mut sorted = all.clone();
        sorted.sort();
        assert_eq!(all, sorted);
    }

    #[tokio::test]
    async fn test_moving_item_rewrites_subtree_paths() {
        let repo = MemoryRepository::new();
        let doc = fixtures::document(&repo, "/content/documents", "a", "ns:doc");
        let session = repo.session();

        let mut handle = doc.handle.clone();
        handle.path = "/content/attic/documents/a".into();
        session.put_item(handle).await.unwrap();

        let preview = session.item(doc.preview.id).await.unwrap().unwrap();
        assert_eq!(preview.path, "/content/attic/documents/a/a");
        assert_eq!(
            session
                .item_by_path("/content/attic/documents/a/a")
                .await
                .unwrap()
                .map(|i| i.id),
            Some(doc.preview.id)
        );
    }

    #[tokio::test]
    async fn test_histories_survive_item_removal() {
        let repo = MemoryRepository::new();
        let doc = fixtures::deleted_document(&repo, "gone", "ns:doc", Some(Utc::now()));
        let session = repo.session();
        session.remove_item(doc.handle.id).await.unwrap();
        session.save().await.unwrap();

        assert!(session.item(doc.preview.id).await.unwrap().is_none());
        assert_eq!(session.revision_history(doc.preview.id).await.unwrap().len(), 1);
        assert_eq!(doc.preview.kind, ItemKind::Deleted);
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip_through_file() {
        let repo = MemoryRepository::new();
        let doc = fixtures::document(&repo, "/content/documents", "a", "ns:doc");
        let file = tempfile::NamedTempFile::new().unwrap();

        repo.persist(file.path()).unwrap();
        let loaded = MemoryRepository::load(file.path()).unwrap();
        let snapshot = loaded.snapshot();
        assert_eq!(snapshot.items.get(&doc.preview.id), Some(&doc.preview));
        assert_eq!(snapshot.histories.get(&doc.preview.id).map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_save_tolerates_concurrent_removal() {
        let repo = MemoryRepository::new();
        let doc = fixtures::document(&repo, "/content/documents", "a", "ns:doc");
        let first = repo.session();
        let second = repo.session();

        first.remove_item(doc.handle.id).await.unwrap();
        second.remove_item(doc.handle.id).await.unwrap();
        first.save().await.unwrap();
        second.save().await.unwrap();
        assert!(!repo.snapshot().items.contains_key(&doc.handle.id));
    }
}
