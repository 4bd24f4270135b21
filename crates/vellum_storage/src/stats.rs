//! Operation counters.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of store statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoreStats {
    /// Create calls
    pub create_count: u64,
    /// Read calls, including history and version reads
    pub read_count: u64,
    /// Reads served from the cache
    pub cache_hits: u64,
    /// Update calls
    pub update_count: u64,
    /// Relabel calls
    pub relabel_count: u64,
    /// Delete and undelete calls
    pub delete_count: u64,
    /// Erase and erase_history calls
    pub erase_count: u64,
    /// Objects currently cached
    pub cache_entries: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) create: AtomicU64,
    pub(crate) read: AtomicU64,
    pub(crate) update: AtomicU64,
    pub(crate) relabel: AtomicU64,
    pub(crate) delete: AtomicU64,
    pub(crate) erase: AtomicU64,
}

impl Counters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, cache_hits: u64, cache_entries: usize) -> StoreStats {
        StoreStats {
            create_count: self.create.load(Ordering::Relaxed),
            read_count: self.read.load(Ordering::Relaxed),
            cache_hits,
            update_count: self.update.load(Ordering::Relaxed),
            relabel_count: self.relabel.load(Ordering::Relaxed),
            delete_count: self.delete.load(Ordering::Relaxed),
            erase_count: self.erase.load(Ordering::Relaxed),
            cache_entries,
        }
    }
}
