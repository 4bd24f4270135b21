//! Retired object versions.
//!
//! Every update archives the row it replaces. Retired rows are kept until
//! the object or its history is erased, and each one is permission checked
//! against its own labels when read.

use crate::object::{ObjectRecord, StoredObject};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vellum_core::UserId;

/// One row of the history table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetiredRecord {
    /// The row as it was before being replaced
    pub record: ObjectRecord,
    /// When it was replaced
    pub retired_at: DateTime<Utc>,
    /// Who replaced it
    pub retired_by: UserId,
}

impl RetiredRecord {
    /// Version of the retired row
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.record.version
    }
}

/// A retired version visible to the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryVersion {
    /// Version number
    pub version: u64,
    /// When it was replaced
    pub retired_at: DateTime<Utc>,
    /// Who replaced it
    pub retired_by: UserId,
    /// The object as it was
    pub object: StoredObject,
}

impl From<RetiredRecord> for HistoryVersion {
    fn from(retired: RetiredRecord) -> Self {
        Self {
            version: retired.record.version,
            retired_at: retired.retired_at,
            retired_by: retired.retired_by,
            object: StoredObject::from_record(retired.record),
        }
    }
}

/// The current version of an object and its readable retired versions
#[derive(Debug, Clone)]
pub struct ObjectHistory {
    /// Current version
    pub object: Arc<StoredObject>,
    /// Retired versions, oldest first
    pub versions: Vec<HistoryVersion>,
}

impl ObjectHistory {
    /// Retired version by number
    #[must_use]
    pub fn version(&self, version: u64) -> Option<&HistoryVersion> {
        self.versions.iter().find(|v| v.version == version)
    }

    /// Number of visible retired versions
    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Check if no retired versions are visible
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}
