// src/job/mod.rs

//! Jobs: one managed shell command each, with a log file and a lifecycle.
//!
//! - [`id`] encodes `(command, creation time)` into a file-name-safe ID.
//! - [`state`] is the forward-only lifecycle state machine.
//! - [`log_file`] renders and parses the log header and footer.
//! - [`lifecycle`] owns the process: create, start, kill, close.
//! - [`record`] is the serialisable snapshot, also rebuilt from disk.
//! - [`registry`] maps IDs to jobs for the HTTP layer.

pub mod id;
pub mod lifecycle;
pub mod log_file;
pub mod record;
pub mod registry;
pub mod state;

pub use id::{JobId, LOG_SUFFIX};
pub use lifecycle::{Job, JobOutcome, JobRun};
pub use record::JobRecord;
pub use registry::JobRegistry;
pub use state::JobState;
