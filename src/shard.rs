//! Lock-striped hash maps keyed by user identity.
//!
//! Shared per-user tables (rate windows, onboarding sessions, dispatch locks)
//! are split across several mutex-guarded shards so that unrelated identities
//! never contend on the same lock. Guards must not be held across await
//! points; every critical section here is a plain map operation.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Default shard count for identity-keyed tables.
pub const DEFAULT_SHARDS: usize = 16;

/// A `HashMap<i64, V>` partitioned across mutex-guarded shards.
pub struct ShardedMap<V> {
    shards: Vec<Mutex<HashMap<i64, V>>>,
}

impl<V> Default for ShardedMap<V> {
    fn default() -> Self {
        Self::new(DEFAULT_SHARDS)
    }
}

impl<V> ShardedMap<V> {
    /// Creates a map with `shard_count` shards (at least one).
    #[must_use]
    pub fn new(shard_count: usize) -> Self {
        let shards = (0..shard_count.max(1))
            .map(|_| Mutex::new(HashMap::new()))
            .collect();
        Self { shards }
    }

    fn shard(&self, identity: i64) -> &Mutex<HashMap<i64, V>> {
        let index = (identity.unsigned_abs() as usize) % self.shards.len();
        &self.shards[index]
    }

    /// Locks the shard owning `identity` and returns its guard.
    pub fn lock(&self, identity: i64) -> MutexGuard<'_, HashMap<i64, V>> {
        self.shard(identity)
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts a value, returning the previous one if present.
    pub fn insert(&self, identity: i64, value: V) -> Option<V> {
        self.lock(identity).insert(identity, value)
    }

    /// Removes and returns the value for `identity`.
    pub fn remove(&self, identity: i64) -> Option<V> {
        self.lock(identity).remove(&identity)
    }

    /// Whether `identity` has an entry.
    pub fn contains(&self, identity: i64) -> bool {
        self.lock(identity).contains_key(&identity)
    }

    /// Total number of entries across all shards.
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    /// Whether the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all keys, collected shard by shard.
    pub fn keys(&self) -> Vec<i64> {
        let mut keys = Vec::new();
        for shard in &self.shards {
            let guard = shard.lock().unwrap_or_else(PoisonError::into_inner);
            keys.extend(guard.keys().copied());
        }
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_remove_round_trip() {
        let map: ShardedMap<u32> = ShardedMap::new(4);
        assert!(map.insert(1, 10).is_none());
        assert_eq!(map.insert(1, 20), Some(10));
        assert!(map.contains(1));
        assert_eq!(map.remove(1), Some(20));
        assert!(!map.contains(1));
    }

    #[test]
    fn keys_cover_all_shards() {
        let map: ShardedMap<()> = ShardedMap::new(4);
        for id in -8..8 {
            map.insert(id, ());
        }
        let mut keys = map.keys();
        keys.sort_unstable();
        assert_eq!(keys, (-8..8).collect::<Vec<_>>());
        assert_eq!(map.len(), 16);
    }

    #[test]
    fn zero_shard_count_is_clamped() {
        let map: ShardedMap<u8> = ShardedMap::new(0);
        map.insert(42, 1);
        assert_eq!(map.len(), 1);
    }
}
