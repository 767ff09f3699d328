//! Per-role serialization of reconciliation units.

use dashmap::DashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// A lease table keyed by role id.
///
/// Two units on the same role run one after the other; units on different
/// roles do not contend here.
#[derive(Debug, Default)]
pub struct RoleLocks {
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl RoleLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` while holding the lease for `role_id`.
    ///
    /// The entry is removed again once no other caller holds or waits on it.
    pub fn with_role<R>(&self, role_id: i64, work: impl FnOnce() -> R) -> R {
        // Clone the Arc out so the DashMap shard is not held while waiting.
        let lock = Arc::clone(&self.locks.entry(role_id).or_default());
        let result = {
            let _lease = lock.lock().unwrap_or_else(PoisonError::into_inner);
            work()
        };
        drop(lock);

        // Only the map's reference left: nobody holds or waits on the lease.
        self.locks
            .remove_if(&role_id, |_, entry| Arc::strong_count(entry) == 1);
        result
    }

    /// Number of roles with a lease entry.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
