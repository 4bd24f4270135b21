//! Store configuration.

use crate::cache::DEFAULT_MAX_CACHE_ENTRIES;
use serde::{Deserialize, Serialize};
use std::path::Path;
use vellum_core::{CoreError, CoreResult, LabelSet};
use vellum_policy::Operation;

/// Store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Cache size at which the cache is wiped
    pub max_cache_entries: usize,
    /// Requested IDs must be above this; allocation starts above it
    pub reserved_id_threshold: u64,
    /// Label marking deleted objects
    pub deleted_label: u64,
    /// Label given to objects which would otherwise have none
    pub unlabelled_label: Option<u64>,
    /// Operation gating undelete
    pub undelete_operation: Operation,
    /// Operation gating erase and erase_history; `None` means superuser only
    pub erase_operation: Option<Operation>,
    /// Slack allowed when looking up version 1 by time
    pub version_time_tolerance_secs: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_cache_entries: DEFAULT_MAX_CACHE_ENTRIES,
            reserved_id_threshold: 1024,
            deleted_label: 101,
            unlabelled_label: Some(100),
            undelete_operation: Operation::RELABEL,
            erase_operation: None,
            version_time_tolerance_secs: 2,
        }
    }
}

impl StoreConfig {
    /// Parse and validate JSON configuration. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is malformed or the values are invalid
    pub fn from_json_str(json: &str) -> CoreResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| CoreError::Config {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is invalid
    pub fn from_json_file(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| CoreError::Config {
            reason: format!("{}: {}", path.display(), e),
        })?;
        Self::from_json_str(&json)
    }

    /// Check the configuration is usable
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] describing the first problem found
    pub fn validate(&self) -> CoreResult<()> {
        if self.deleted_label == 0 {
            return Err(CoreError::Config {
                reason: "deleted_label must be a positive label".to_string(),
            });
        }
        match self.unlabelled_label {
            Some(0) => Err(CoreError::Config {
                reason: "unlabelled_label must be a positive label".to_string(),
            }),
            Some(label) if label == self.deleted_label => Err(CoreError::Config {
                reason: "unlabelled_label and deleted_label must differ".to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// The deleted label as a set
    ///
    /// # Errors
    ///
    /// Returns error if the deleted label is zero
    pub fn deleted_labels(&self) -> CoreResult<LabelSet> {
        LabelSet::new([self.deleted_label])
    }

    /// Tolerance for version 1 time lookups
    #[must_use]
    pub fn version_time_tolerance(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::from(self.version_time_tolerance_secs))
    }
}
