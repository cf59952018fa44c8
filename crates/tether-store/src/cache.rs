//! Identity cache
//!
//! Process-wide map from (type name, id) to the single shared in-memory
//! instance of that record. This is a correctness cache, not a performance
//! cache: relation cascades mutate the cached instance in place so every
//! holder observes the edit, which only works while there is at most one
//! live instance per key. Entries leave through explicit eviction or
//! delete; there is no automatic bound, since silent eviction would break
//! the shared-instance invariant for records still reachable from an
//! object graph.

use std::collections::HashMap;

use tether_core::record::SharedHandle;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    name: &'static str,
    id: i64,
}

/// Map from (type name, id) to the shared loaded instance
#[derive(Default)]
pub struct IdentityCache {
    entries: HashMap<CacheKey, SharedHandle>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Look up the shared instance for a key; logs hits and misses
    /// (diagnostic only)
    pub fn get(&self, name: &'static str, id: i64) -> Option<SharedHandle> {
        match self.entries.get(&CacheKey { name, id }) {
            Some(handle) => {
                debug!(type_name = name, id, "identity cache hit");
                Some(handle.clone())
            }
            None => {
                debug!(type_name = name, id, "identity cache miss");
                None
            }
        }
    }

    /// Insert or replace the instance for a key
    pub fn put(&mut self, name: &'static str, id: i64, handle: SharedHandle) {
        self.entries.insert(CacheKey { name, id }, handle);
    }

    /// Remove the entry for a key; returns whether one was present
    pub fn evict(&mut self, name: &'static str, id: i64) -> bool {
        self.entries.remove(&CacheKey { name, id }).is_some()
    }

    pub fn contains(&self, name: &'static str, id: i64) -> bool {
        self.entries.contains_key(&CacheKey { name, id })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
