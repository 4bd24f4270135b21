//! Operation names.
//!
//! Operations are open-ended names. The store uses the five built-in ones;
//! applications may add their own and gate on them through statements.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// A named operation that a permission statement can allow or deny
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Operation(Cow<'static, str>);

impl Operation {
    /// Create objects
    pub const CREATE: Self = Self::from_static("create");
    /// Read objects
    pub const READ: Self = Self::from_static("read");
    /// Write new versions of objects
    pub const UPDATE: Self = Self::from_static("update");
    /// Change the labels of objects
    pub const RELABEL: Self = Self::from_static("relabel");
    /// Mark objects as deleted
    pub const DELETE: Self = Self::from_static("delete");
    /// Physically remove objects or their history
    pub const ERASE: Self = Self::from_static("erase");

    /// Create an operation from any name
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// Create an operation from a static name
    #[must_use]
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Operation name
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Operation {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl std::str::FromStr for Operation {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}
