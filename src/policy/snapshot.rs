use std::sync::Arc;

use parking_lot::RwLock;

use super::PolicyTable;

/// Shared, atomically replaceable policy table.
///
/// Readers take an `Arc` to the current table and keep using it for the rest
/// of their work; a reconfiguration publishes a whole new table and never
/// mutates one in place.
#[derive(Debug, Clone, Default)]
pub struct PolicyHandle {
    current: Arc<RwLock<Arc<PolicyTable>>>,
}

impl PolicyHandle {
    pub fn new(table: PolicyTable) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(table))),
        }
    }

    pub fn load(&self) -> Arc<PolicyTable> {
        self.current.read().clone()
    }

    /// Publish a new table, returning the one it replaced.
    pub fn store(&self, table: PolicyTable) -> Arc<PolicyTable> {
        std::mem::replace(&mut *self.current.write(), Arc::new(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::RetentionPolicy;

    #[test]
    fn test_readers_keep_their_snapshot() {
        let handle = PolicyHandle::new(PolicyTable::new(RetentionPolicy::new(10, -1)));
        let before = handle.load();

        let previous = handle.store(PolicyTable::new(RetentionPolicy::new(1, 1)));
        assert_eq!(previous.default_policy(), RetentionPolicy::new(10, -1));
        assert_eq!(before.default_policy(), RetentionPolicy::new(10, -1));
        assert_eq!(handle.load().default_policy(), RetentionPolicy::new(1, 1));
    }

    #[test]
    fn test_clones_share_state() {
        let handle = PolicyHandle::default();
        let other = handle.clone();
        other.store(PolicyTable::new(RetentionPolicy::new(3, 3)));
        assert_eq!(handle.load().default_policy(), RetentionPolicy::new(3, 3));
    }
}
