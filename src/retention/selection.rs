use chrono::{DateTime, TimeDelta, Utc};

use crate::{policy::RetentionPolicy, store::Revision};

/// Why a revision was selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionReason {
    /// Older than the maximum age.
    Aged,
    /// Beyond the maximum revision count.
    Surplus,
}

impl DeletionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aged => "aged",
            Self::Surplus => "surplus",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionDeletion {
    pub revision: Revision,
    pub reason: DeletionReason,
}

/// Select the revisions that `policy` says must go, oldest first.
///
/// Root and labeled revisions are never selected. Revisions with identical
/// creation times keep their store order.
pub fn select_revisions_to_delete(
    revisions: &[Revision],
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Vec<RevisionDeletion> {
    if policy.is_unlimited() {
        return Vec::new();
    }

    let mut working: Vec<&Revision> = revisions
        .iter()
        .filter(|r| !r.is_root() && !r.is_labeled())
        .collect();
    // stable: ties keep store order
    working.sort_by_key(|r| r.created);

    let mut selected = Vec::new();

    if policy.has_max_age() {
        let max_age = TimeDelta::try_days(policy.max_age_days).unwrap_or(TimeDelta::MAX);
        working.retain(|revision| {
            let aged = now.signed_duration_since(revision.created) > max_age;
            if aged {
                selected.push(RevisionDeletion {
                    revision: (*revision).clone(),
                    reason: DeletionReason::Aged,
                });
            }
            !aged
        });
    }

    if policy.has_max_revisions() {
        let limit = usize::try_from(policy.max_revision_count).unwrap_or(usize::MAX);
        let surplus = working.len().saturating_sub(limit);
        selected.extend(working.drain(..surplus).map(|revision| RevisionDeletion {
            revision: revision.clone(),
            reason: DeletionReason::Surplus,
        }));
    }

    selected
}
