//! Read cache of committed objects.
//!
//! Entries are shared `Arc<StoredObject>` values, so repeated reads of an
//! unchanged object return the same allocation. Mutators evict; readers
//! repopulate. An eviction epoch stops a reader that fetched a row before
//! an eviction from putting that stale row back.

use crate::object::StoredObject;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;
use vellum_core::ObjectId;

/// Default maximum number of cached objects before the cache is wiped
pub const DEFAULT_MAX_CACHE_ENTRIES: usize = 8096;

/// ID-keyed cache of committed objects
#[derive(Debug)]
pub struct ObjectCache {
    entries: RwLock<HashMap<ObjectId, Arc<StoredObject>>>,
    max_entries: usize,
    epoch: AtomicU64,
    hits: AtomicU64,
}

impl ObjectCache {
    /// Create a cache holding at most `max_entries` objects
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries,
            epoch: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        }
    }

    /// Cached object, counting a hit when present
    #[must_use]
    pub fn get(&self, id: ObjectId) -> Option<Arc<StoredObject>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let object = entries.get(&id).cloned();
        if object.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        object
    }

    /// Current eviction epoch. Capture before reading the backend and pass
    /// to [`insert_if_unchanged`](Self::insert_if_unchanged).
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Cache an object unless anything was evicted since `epoch`
    pub fn insert_if_unchanged(&self, object: Arc<StoredObject>, epoch: u64) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if self.epoch.load(Ordering::SeqCst) != epoch {
            return false;
        }
        if entries.len() >= self.max_entries {
            debug!(entries = entries.len(), "object cache full, clearing");
            entries.clear();
        }
        entries.insert(object.id(), object);
        true
    }

    /// Drop the entry for an ID
    pub fn evict(&self, id: ObjectId) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        self.epoch.fetch_add(1, Ordering::SeqCst);
        entries.remove(&id).is_some()
    }

    /// Drop every entry
    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        self.epoch.fetch_add(1, Ordering::SeqCst);
        entries.clear();
    }

    /// Check if an ID is cached
    #[must_use]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    /// Number of cached objects
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of hits so far
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }
}

impl Default for ObjectCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CACHE_ENTRIES)
    }
}
