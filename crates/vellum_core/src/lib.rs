//! VELLUM Core Types
//!
//! Pure types with no I/O: identifiers, labels, label deltas, errors and
//! clocks. Everything here is shared by the policy and storage crates.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod id;
pub mod label;
pub mod time;

// Re-exports
pub use error::{CoreError, CoreResult};
pub use id::{ObjectId, UserId};
pub use label::{IntoLabel, LabelDelta, LabelSet};
pub use time::{Clock, ManualClock, SystemClock};
