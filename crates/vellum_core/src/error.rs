//! Core error types for VELLUM.

use std::fmt;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// A label was zero, negative or otherwise not a positive integer
    #[error("Invalid label: {label}")]
    InvalidLabel {
        /// Offending value as written by the caller
        label: String,
    },

    /// Label set literal did not look like `{1,2,3}`
    #[error("Malformed label set literal: {literal}")]
    MalformedLabelSet {
        /// Offending literal
        literal: String,
    },

    /// Attempt to add a rule to a sealed permission statement
    #[error("Permission statement is sealed")]
    StatementSealed,

    /// The principal may not perform the operation.
    ///
    /// Only the operation name is carried so the object's labels never leak.
    #[error("Permission denied: {operation}")]
    PermissionDenied {
        /// Operation that was denied
        operation: String,
    },

    /// An update was based on a version which is no longer current
    #[error("Stale version: update based on version {expected}, stored version is {actual}")]
    StaleVersion {
        /// Version the caller read
        expected: u64,
        /// Version currently stored
        actual: u64,
    },

    /// The stored row changed between an update's read and its write
    #[error("Object {id} was modified concurrently")]
    ConcurrentModification {
        /// Object ID
        id: u64,
    },

    /// Invalid or unavailable object ID
    #[error("Invalid ID: {reason}")]
    InvalidId { reason: String },

    /// Create was called with a draft that has already been stored
    #[error("Object has already been stored")]
    AlreadyStored,

    /// Not found
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    /// Failure inside the storage backend
    #[error("Backend error: {reason}")]
    Backend { reason: String },

    /// Serialization failure
    #[error("Encoding error: {reason}")]
    Encoding { reason: String },

    /// Invalid configuration value
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },
}

impl CoreError {
    /// Build a permission denied error for an operation
    pub fn permission_denied(operation: impl fmt::Display) -> Self {
        Self::PermissionDenied {
            operation: operation.to_string(),
        }
    }

    /// Build a not found error
    pub fn not_found(kind: impl Into<String>, id: impl fmt::Display) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.to_string(),
        }
    }

    /// Build a backend error from anything displayable
    pub fn backend(reason: impl fmt::Display) -> Self {
        Self::Backend {
            reason: reason.to_string(),
        }
    }

    /// Whether this error is a permission denial
    #[must_use]
    pub const fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encoding {
            reason: err.to_string(),
        }
    }
}
