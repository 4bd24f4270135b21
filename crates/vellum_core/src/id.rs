//! Identifiers for VELLUM entities.
//!
//! Object IDs are positive integers drawn from a store-wide sequence. Because
//! labels are also positive integers, an object's ID can be used as a label
//! on other objects.

use serde::{Deserialize, Serialize};

/// Object identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Create from raw value
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Get raw value
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Zero is never a valid object ID
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ObjectId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl std::str::FromStr for ObjectId {
    type Err = crate::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|e| crate::CoreError::InvalidId {
                reason: format!("{s:?}: {e}"),
            })
    }
}

/// User identifier, recorded as creator and updater of objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(u64);

impl UserId {
    /// The system user, used by tooling acting on behalf of no one
    pub const SYSTEM: Self = Self(0);

    /// Create from raw value
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Get raw value
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "user_{}", self.0)
    }
}

impl From<u64> for UserId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id_display() {
        let id = ObjectId::from_raw(1025);
        assert_eq!(id.to_string(), "1025");
        assert_eq!(id.as_u64(), 1025);
    }

    #[test]
    fn test_object_id_parse() {
        let id: ObjectId = " 77 ".parse().unwrap();
        assert_eq!(id, ObjectId::from_raw(77));
        assert!("abc".parse::<ObjectId>().is_err());
        assert!("-3".parse::<ObjectId>().is_err());
    }

    #[test]
    fn test_zero_is_invalid() {
        assert!(!ObjectId::from_raw(0).is_valid());
        assert!(ObjectId::from_raw(1).is_valid());
    }

    #[test]
    fn test_user_id_serialization() {
        let user = UserId::from_raw(12);
        let json = serde_json::to_string(&user).unwrap();
        assert_eq!(json, "12");
        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, user);
        assert_eq!(user.to_string(), "user_12");
    }
}
