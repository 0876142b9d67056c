//! Revision retention: deciding which historical revisions of an item survive.
//!
//! Selection runs two passes over a working set that excludes the root
//! revision and labeled revisions:
//! 1. Age: every revision older than `max_age_days` is selected.
//! 2. Count: of what the age pass left, the oldest revisions beyond
//!    `max_revision_count` are selected.
//!
//! The result is ordered oldest first and is the order in which revisions
//! are removed from the store.

mod selection;

pub use selection::{DeletionReason, RevisionDeletion, select_revisions_to_delete};
