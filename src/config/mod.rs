// src/config/mod.rs

//! Configuration loading and validation for jobtail.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate invariants such as heartbeat < liveness timeout (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{
    default_config_path, load_and_validate, load_from_path, load_or_default, load_raw_or_default,
};
pub use model::{ConfigFile, JobsSection, RawConfigFile, ServerSection};
pub use validate::validate_config;
