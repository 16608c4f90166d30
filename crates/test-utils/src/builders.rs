#![allow(dead_code)]

use std::path::Path;

use jobtail::config::{ConfigFile, RawConfigFile};
use jobtail::types::ChangeSourceKind;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn log_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.jobs.log_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn change_source(mut self, kind: ChangeSourceKind) -> Self {
        self.config.jobs.change_source = kind;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.jobs.poll_interval_ms = ms;
        self
    }

    pub fn timing(mut self, heartbeat_secs: u64, liveness_timeout_secs: u64) -> Self {
        self.config.server.heartbeat_secs = heartbeat_secs;
        self.config.server.liveness_timeout_secs = liveness_timeout_secs;
        self
    }

    pub fn hub_client_buffer(mut self, capacity: usize) -> Self {
        self.config.server.hub_client_buffer = capacity;
        self
    }

    pub fn location(mut self, name: &str, path: impl AsRef<Path>) -> Self {
        self.config
            .locations
            .insert(name.to_string(), path.as_ref().to_path_buf());
        self
    }

    /// The unvalidated config, for exercising validation itself.
    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
