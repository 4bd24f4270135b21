//! VELLUM Policy System
//!
//! Label-based permission statements: explicit allow/deny rules per
//! operation, the superuser statement, and/or composition, bitmask table
//! decoding and SQL predicate generation. Also attribute restriction rules.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bitmask;
pub mod operation;
pub mod principal;
pub mod restrict;
pub mod statement;

// Re-exports
pub use bitmask::{from_bitmasks, BitmaskDecoder, BitmaskRow};
pub use operation::Operation;
pub use principal::Principal;
pub use restrict::{AttributeRestrictions, RestrictionPolicy, RestrictionRule};
pub use statement::{
    Combinator, ExplicitStatement, ParseCombinatorError, PermissionStatement, Rule,
    StatementSummary,
};
