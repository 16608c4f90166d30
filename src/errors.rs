// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Failures are contained to the Job or session that produced them; nothing
//! in here is ever allowed to take the whole service down.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobtailError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl JobtailError {
    pub fn not_found(what: impl Into<String>) -> Self {
        JobtailError::NotFound(what.into())
    }

    pub fn invalid(what: impl Into<String>) -> Self {
        JobtailError::InvalidArgument(what.into())
    }

    /// True for `NotFound`, and for IO errors of kind `NotFound`.
    pub fn is_not_found(&self) -> bool {
        match self {
            JobtailError::NotFound(_) => true,
            JobtailError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, JobtailError>;
