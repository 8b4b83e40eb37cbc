//! In-flight markers for address sets
//!
//! A set is busy while any address in it belongs to a running sync, so two
//! syncs never touch the same [`crate::AddressSyncState`] at once.

use alph_core::AddressHash;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Normalized address set
pub type SetKey = BTreeSet<AddressHash>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    running: HashMap<u64, SetKey>,
}

/// Outcome of [`InflightRegistry::acquire`]
pub enum InflightLease {
    /// Caller owns the sync until the token drops
    Leader(InflightToken),
    /// An overlapping sync is running
    Busy,
}

/// Held by the sync leader; releases the addresses on drop
pub struct InflightToken {
    id: u64,
    registry: Arc<Mutex<Registry>>,
}

impl Drop for InflightToken {
    fn drop(&mut self) {
        self.registry.lock().running.remove(&self.id);
    }
}

/// Registry of running syncs
#[derive(Clone, Default)]
pub struct InflightRegistry {
    inner: Arc<Mutex<Registry>>,
}

impl InflightRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key` unless it overlaps a running sync
    pub fn acquire(&self, key: &SetKey) -> InflightLease {
        let mut registry = self.inner.lock();
        if find_overlap_locked(&registry, key) {
            return InflightLease::Busy;
        }
        let id = registry.next_id;
        registry.next_id += 1;
        registry.running.insert(id, key.clone());
        InflightLease::Leader(InflightToken {
            id,
            registry: self.inner.clone(),
        })
    }

    /// Whether any address of `key` is being synced
    pub fn is_busy(&self, key: &SetKey) -> bool {
        find_overlap_locked(&self.inner.lock(), key)
    }
}

fn find_overlap_locked(registry: &Registry, key: &SetKey) -> bool {
    registry
        .running
        .values()
        .any(|running| !running.is_disjoint(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(addresses: &[&str]) -> SetKey {
        addresses.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn test_overlapping_sets_are_busy() {
        let registry = InflightRegistry::new();
        let lease = registry.acquire(&key(&["a", "b"]));
        assert!(matches!(lease, InflightLease::Leader(_)));
        assert!(matches!(registry.acquire(&key(&["b", "c"])), InflightLease::Busy));
        assert!(matches!(registry.acquire(&key(&["a", "b"])), InflightLease::Busy));
        assert!(matches!(registry.acquire(&key(&["c"])), InflightLease::Leader(_)));
    }

    #[test]
    fn test_drop_releases() {
        let registry = InflightRegistry::new();
        let lease = registry.acquire(&key(&["a"]));
        assert!(registry.is_busy(&key(&["a"])));
        drop(lease);
        assert!(!registry.is_busy(&key(&["a"])));
        assert!(matches!(registry.acquire(&key(&["a"])), InflightLease::Leader(_)));
    }
}
