//! Ownership lookups over parent links.

use std::collections::HashSet;

use super::{ContentSession, Item, ItemKind, StoreResult, VariantState};

/// Resolve the handle owning `item`.
///
/// A handle is its own handle; documents, deleted variants and compounds
/// defer to their parent. Anything else has no handle, and neither does an
/// item whose parent links loop back on themselves.
pub async fn find_handle(session: &dyn ContentSession, item: &Item) -> StoreResult<Option<Item>> {
    let mut visited = HashSet::from([item.id]);
    let mut current = item.clone();
    loop {
        match current.kind {
            ItemKind::Handle => return Ok(Some(current)),
            ItemKind::Document | ItemKind::Deleted | ItemKind::Compound => {
                let Some(parent_id) = current.parent else {
                    return Ok(None);
                };
                if !visited.insert(parent_id) {
                    tracing::warn!(path = %item.path, parent_id = %parent_id, "Parent links form a cycle");
                    return Ok(None);
                }
                match session.item(parent_id).await? {
                    Some(parent) => current = parent,
                    None => return Ok(None),
                }
            }
            ItemKind::Folder => return Ok(None),
        }
    }
}

/// Resolve the preview (unpublished) variant for a lifecycle event subject.
///
/// The subject may be the variant itself or its handle.
pub async fn find_preview_variant(
    session: &dyn ContentSession,
    subject: &Item,
) -> StoreResult<Option<Item>> {
    if subject.variant_state == Some(VariantState::Unpublished) {
        return Ok(Some(subject.clone()));
    }
    let Some(handle) = find_handle(session, subject).await? else {
        return Ok(None);
    };
    Ok(session
        .children(handle.id)
        .await?
        .into_iter()
        .find(|variant| {
            variant.name == handle.name && variant.variant_state == Some(VariantState::Unpublished)
        }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{MemoryRepository, fixtures};

    #[tokio::test]
    async fn test_find_handle_walks_up_from_compound() {
        let repo = MemoryRepository::new();
        let doc = fixtures::document(&repo, "/content/documents", "a", "ns:doc");
        let mut compound = doc.preview.clone();
        compound.id = uuid::Uuid::new_v4();
        compound.parent = Some(doc.preview.id);
        compound.name = "ns:body".into();
        compound.path = format!("{}/ns:body", doc.preview.path);
        compound.kind = ItemKind::Compound;
        compound.versionable = false;
        compound.variant_state = None;
        repo.insert_item(compound.clone());
        let session = repo.session();

        let handle = find_handle(&session, &compound).await.unwrap().unwrap();
        assert_eq!(handle.id, doc.handle.id);
        assert_eq!(
            find_handle(&session, &doc.handle).await.unwrap().map(|h| h.id),
            Some(doc.handle.id)
        );
    }

    #[tokio::test]
    async fn test_find_handle_stops_on_parent_cycle() {
        let repo = MemoryRepository::new();
        let doc = fixtures::document(&repo, "/content/documents", "a", "ns:doc");
        let mut compound = doc.preview.clone();
        compound.id = uuid::Uuid::new_v4();
        compound.parent = Some(doc.preview.id);
        compound.name = "ns:body".into();
        compound.path = format!("{}/ns:body", doc.preview.path);
        compound.kind = ItemKind::Compound;
        compound.variant_state = None;
        repo.insert_item(compound.clone());
        let mut looped = doc.preview.clone();
        looped.parent = Some(compound.id);
        repo.insert_item(looped.clone());
        let session = repo.session();

        assert!(find_handle(&session, &compound).await.unwrap().is_none());
        assert!(find_handle(&session, &looped).await.unwrap().is_none());
        assert!(find_preview_variant(&session, &compound).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_handle_none_for_folder() {
        let repo = MemoryRepository::new();
        let folder = fixtures::folder(&repo, "/content/documents");
        let session = repo.session();
        assert!(find_handle(&session, &folder).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_preview_variant_from_handle() {
        let repo = MemoryRepository::new();
        let doc = fixtures::document(&repo, "/content/documents", "a", "ns:doc");
        let published = fixtures::add_variant(&repo, &doc.handle, VariantState::Published);
        let session = repo.session();

        let from_handle = find_preview_variant(&session, &doc.handle).await.unwrap();
        assert_eq!(from_handle.map(|v| v.id), Some(doc.preview.id));
        let from_live = find_preview_variant(&session, &published).await.unwrap();
        assert_eq!(from_live.map(|v| v.id), Some(doc.preview.id));
        let from_self = find_preview_variant(&session, &doc.preview).await.unwrap();
        assert_eq!(from_self.map(|v| v.id), Some(doc.preview.id));
    }
}
