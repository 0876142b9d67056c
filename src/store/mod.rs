//! Content store abstraction.
//!
//! The cleaner never owns content: it reads items and revision histories
//! through a [`ContentSession`], stages removals, and commits them one item at a
//! time with [`ContentSession::save`]. A session is exclusive to a single
//! pipeline run and is never shared between concurrently processed items.
//!
//! [`memory`] provides an in-process implementation backed by JSON snapshots,
//! used by the CLI and by the test suite.

mod error;
pub mod memory;
pub mod predicate;
pub mod tree;
pub mod workflow;

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
pub use error::{StoreError, StoreResult};
pub use predicate::{OrderBy, Predicate, PredicateFilter};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
pub use workflow::{DocumentWorkflow, Hints, WorkflowError};

/// Name of the implicit first revision of every history. Never deletable.
pub const ROOT_REVISION: &str = "jcr:rootVersion";

/// Root of all editable content.
pub const CONTENT_ROOT: &str = "/content";

/// Holding area that deleted items are moved into before they are purged.
pub const ATTIC_ROOT: &str = "/content/attic";

/// Structural role of an item in the content tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Folder,
    /// Container grouping the variants of one document.
    Handle,
    /// A document variant (draft, unpublished or published).
    Document,
    /// A nested compound inside a document.
    Compound,
    /// A document variant that has been moved to the attic.
    Deleted,
}

/// Publication state of a document variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantState {
    Draft,
    /// The preview variant; it carries the revision history.
    Unpublished,
    Published,
}

/// State summary value of a document that has never been published.
pub const STATE_SUMMARY_NEW: &str = "new";

/// An addressable content entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    #[serde(default)]
    pub parent: Option<Uuid>,
    pub name: String,
    pub path: String,
    pub content_type: String,
    pub kind: ItemKind,
    #[serde(default)]
    pub versionable: bool,
    #[serde(default)]
    pub variant_state: Option<VariantState>,
    #[serde(default)]
    pub state_summary: Option<String>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    /// Named date properties (e.g. a depublication date).
    #[serde(default)]
    pub dates: BTreeMap<String, DateTime<Utc>>,
}

impl Item {
    /// Whether the item lives in the deleted-items holding area.
    pub fn in_attic(&self) -> bool {
        self.path.starts_with(&format!("{ATTIC_ROOT}/"))
    }
}

/// An immutable historical snapshot of an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub name: String,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl Revision {
    pub fn new(name: impl Into<String>, created: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            created,
            labels: Vec::new(),
        }
    }

    pub fn root(created: DateTime<Utc>) -> Self {
        Self::new(ROOT_REVISION, created)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    pub fn is_root(&self) -> bool {
        self.name == ROOT_REVISION
    }

    /// Labeled revisions are pinned by a human and exempt from cleanup.
    pub fn is_labeled(&self) -> bool {
        !self.labels.is_empty()
    }
}

/// One page of identifiers returned by a predicate query.
#[derive(Debug, Clone, Default)]
pub struct QueryPage {
    pub ids: Vec<Uuid>,
    /// Total number of matches reported by the store, if it knows it.
    pub total_size: Option<u64>,
}

/// A session on the content store.
///
/// All mutations are staged until [`save`](ContentSession::save); a failed item
/// is rolled back with [`discard`](ContentSession::discard).
#[async_trait]
pub trait ContentSession: Send + Sync {
    /// Execute a predicate query, returning at most `limit` identifiers from `offset`.
    async fn query(
        &self,
        predicate: &Predicate,
        offset: u64,
        limit: Option<u64>,
    ) -> StoreResult<QueryPage>;

    /// Fetch an item by identifier. `Ok(None)` when it no longer exists.
    async fn item(&self, id: Uuid) -> StoreResult<Option<Item>>;

    async fn item_by_path(&self, path: &str) -> StoreResult<Option<Item>>;

    async fn children(&self, id: Uuid) -> StoreResult<Vec<Item>>;

    /// All revisions of an item in store iteration order (root first).
    async fn revision_history(&self, id: Uuid) -> StoreResult<Vec<Revision>>;

    async fn remove_revision(&self, id: Uuid, revision: &str) -> StoreResult<()>;

    /// Insert or replace an item. Changing the path of an existing item moves
    /// its whole subtree.
    async fn put_item(&self, item: Item) -> StoreResult<()>;

    /// Remove an item and everything below it. Revision histories are kept.
    async fn remove_item(&self, id: Uuid) -> StoreResult<()>;

    async fn save(&self) -> StoreResult<()>;

    /// Drop every uncommitted change of this session.
    async fn discard(&self) -> StoreResult<()>;
}

/// Hands out exclusive sessions.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn login(&self) -> StoreResult<Arc<dyn ContentSession>>;

    /// Document workflow for handles of this repository.
    fn workflow(&self) -> Arc<dyn DocumentWorkflow> {
        Arc::new(workflow::BasicDocumentWorkflow)
    }
}

/// Best-effort path lookup used in log messages.
pub async fn item_path(session: &dyn ContentSession, id: Uuid) -> String {
    match session.item(id).await {
        Ok(Some(item)) => item.path,
        _ => String::new(),
    }
}
