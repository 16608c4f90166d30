// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{JobtailError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::JobtailError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

/// Check the semantic invariants serde cannot express.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    validate_server(cfg)?;
    validate_jobs(cfg)?;
    validate_locations(cfg)?;
    Ok(())
}

fn validate_server(cfg: &RawConfigFile) -> Result<()> {
    let server = &cfg.server;

    if server.bind.trim().is_empty() {
        return Err(config_error("[server].bind must not be empty"));
    }

    if server.heartbeat_secs == 0 {
        return Err(config_error("[server].heartbeat_secs must be >= 1 (got 0)"));
    }

    if server.heartbeat_secs >= server.liveness_timeout_secs {
        return Err(config_error(format!(
            "[server].heartbeat_secs ({}) must be shorter than liveness_timeout_secs ({})",
            server.heartbeat_secs, server.liveness_timeout_secs
        )));
    }

    if server.hub_client_buffer == 0 {
        return Err(config_error("[server].hub_client_buffer must be >= 1 (got 0)"));
    }

    Ok(())
}

fn validate_jobs(cfg: &RawConfigFile) -> Result<()> {
    let jobs = &cfg.jobs;

    if jobs.log_dir.as_os_str().is_empty() {
        return Err(config_error("[jobs].log_dir must not be empty"));
    }

    if jobs.shell.trim().is_empty() {
        return Err(config_error("[jobs].shell must not be empty"));
    }

    if jobs.poll_interval_ms == 0 {
        return Err(config_error("[jobs].poll_interval_ms must be >= 1 (got 0)"));
    }

    Ok(())
}

fn validate_locations(cfg: &RawConfigFile) -> Result<()> {
    for (name, path) in cfg.locations.iter() {
        if name.trim().is_empty() {
            return Err(config_error("[locations] entries need a non-empty name"));
        }
        if path.as_os_str().is_empty() {
            return Err(config_error(format!(
                "location '{}' has an empty path",
                name
            )));
        }
    }
    Ok(())
}

fn config_error(msg: impl Into<String>) -> JobtailError {
    JobtailError::Config(msg.into())
}
