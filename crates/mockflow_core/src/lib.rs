//! mockflow Core Types
//!
//! Pure types shared by the planner, the runtime and the CLI.
//! Nothing in this crate performs I/O or spawns threads.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod id;

// Re-exports
pub use error::{CoreError, CoreResult};
pub use id::{EventToken, LineId, NodeId, RunId};
