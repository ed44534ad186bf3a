//! Orchestration layer for kiln.
//!
//! The runner executes tasks from the registry; the watch module turns file
//! changes into coalesced re-runs.

mod scheduler;
pub mod watch;

pub use scheduler::{format_elapsed, FailurePolicy, RunEvent, RunReport, Runner};
pub use watch::{start_watching, RerunSlot, WatchRoute};
