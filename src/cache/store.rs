//! Sharded current-value map.

use crate::types::{CurrentValue, RecordId, Timestamp};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Default number of lock shards.
const DEFAULT_SHARDS: usize = 16;

/// Snapshot of cache occupancy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub shards: usize,
}

/// Concurrent map from record id to its last observed value.
///
/// Each entry is stored and replaced as one `CurrentValue`, so a reader sees
/// either the complete previous pair or the complete new one. Writers to the
/// same id race; the last to take the shard lock wins.
pub struct CurrentValueCache {
    shards: Vec<RwLock<HashMap<RecordId, CurrentValue>>>,
}

impl CurrentValueCache {
    /// Create a cache with the default shard count.
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    /// Create a cache with a custom shard count (at least one).
    pub fn with_shards(count: usize) -> Self {
        let count = count.max(1);
        Self {
            shards: (0..count).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, id: &RecordId) -> &RwLock<HashMap<RecordId, CurrentValue>> {
        let idx = (id.fold() % self.shards.len() as u64) as usize;
        &self.shards[idx]
    }

    /// Overwrite the current value for `id`.
    pub fn set(&self, id: RecordId, value: Option<f64>, ts: Timestamp) {
        self.shard(&id)
            .write()
            .insert(id, CurrentValue::observed(ts, value));
    }

    /// Last observed value for `id`, or the empty value if never written.
    pub fn get(&self, id: &RecordId) -> CurrentValue {
        self.shard(id).read().get(id).copied().unwrap_or_default()
    }

    /// Whether `id` has ever been written.
    pub fn contains(&self, id: &RecordId) -> bool {
        self.shard(id).read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.read().is_empty())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            shards: self.shards.len(),
        }
    }
}

impl Default for CurrentValueCache {
    fn default() -> Self {
        Self::new()
    }
}
