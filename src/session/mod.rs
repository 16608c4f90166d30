// src/session/mod.rs

//! Live viewing of a running job over a full-duplex transport.

pub mod live;
pub mod protocol;

pub use live::{LiveSession, DEFAULT_HEARTBEAT, DEFAULT_LIVENESS_TIMEOUT};
pub use protocol::{ControlToken, Inbound, Outbound, SessionEnd};
