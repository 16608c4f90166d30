// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{JobtailError, Result};

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| {
        JobtailError::Config(format!("reading config file {}: {e}", path.display()))
    })?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and run validation.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Load the config the CLI asked for, validated.
///
/// An explicitly given path must exist. When no path was given, the default
/// `Jobtail.toml` is used if present and built-in defaults otherwise.
pub fn load_or_default(path: Option<&Path>) -> Result<ConfigFile> {
    ConfigFile::try_from(load_raw_or_default(path)?)
}

/// Like [`load_or_default`], but stops before validation so callers can
/// apply overrides first.
pub fn load_raw_or_default(path: Option<&Path>) -> Result<RawConfigFile> {
    match path {
        Some(path) => load_from_path(path),
        None => {
            let default_path = default_config_path();
            if default_path.is_file() {
                load_from_path(&default_path)
            } else {
                info!(
                    path = %default_path.display(),
                    "no config file found; using built-in defaults"
                );
                Ok(RawConfigFile::default())
            }
        }
    }
}

/// Default config location: `Jobtail.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Jobtail.toml")
}
