// src/tail/mod.rs

//! Following a growing log file.
//!
//! - [`source`]: pluggable change signals (filesystem notifications or polling).
//! - [`tailer`]: watermark bookkeeping and delta reads.

pub mod source;
pub mod tailer;

pub use source::{source_for, Change, ChangeSource, NotifySource, PollSource};
pub use tailer::{TailCloser, Tailer, MAX_CHUNK};
