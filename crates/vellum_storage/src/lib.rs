//! VELLUM Storage
//!
//! Versioned object store gated by label-based permissions.
//! Every write goes through one pipeline: compute labels, check the
//! principal's statement, commit to the backend, evict the cache, notify.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod cache;
pub mod config;
pub mod history;
pub mod hooks;
pub mod object;
pub mod redb_backend;
pub mod stats;
pub mod store;

// Re-exports
pub use backend::{Backend, MemoryBackend};
pub use cache::{DEFAULT_MAX_CACHE_ENTRIES, ObjectCache};
pub use config::StoreConfig;
pub use history::{HistoryVersion, ObjectHistory, RetiredRecord};
pub use hooks::{
    ChangeKind, ChangeListener, LabelDefaulter, NoHooks, PermissionCheck, PermissionOverride,
    RestrictionLabels, StoreHooks, Verdict,
};
pub use object::{Attributes, ObjectDraft, ObjectRecord, StoredObject};
pub use redb_backend::RedbBackend;
pub use stats::StoreStats;
pub use store::ObjectStore;
