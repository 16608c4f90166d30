// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::ChangeSourceKind;

/// Configuration exactly as read from a TOML file.
///
/// ```toml
/// [server]
/// bind = "127.0.0.1:8080"
/// heartbeat_secs = 54
///
/// [jobs]
/// log_dir = "logs"
/// change_source = "notify"
///
/// [locations]
/// media = "/srv/media"
/// ```
///
/// All sections are optional and have reasonable defaults. Convert into a
/// [`ConfigFile`] (which validates) before use.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub jobs: JobsSection,

    /// Named root directories a Job may use as its working directory.
    #[serde(default)]
    pub locations: BTreeMap<String, PathBuf>,
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Period of live-session keepalive frames.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,

    /// How long a viewer may stay silent before the transport gives up on it.
    /// The heartbeat period must be strictly shorter.
    #[serde(default = "default_liveness_timeout_secs")]
    pub liveness_timeout_secs: u64,

    /// Outbound buffer per hub client; a client that falls this far behind
    /// is dropped.
    #[serde(default = "default_hub_client_buffer")]
    pub hub_client_buffer: usize,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_liveness_timeout_secs() -> u64 {
    60
}

fn default_heartbeat_secs() -> u64 {
    // 9/10 of the liveness timeout.
    default_liveness_timeout_secs() * 9 / 10
}

fn default_hub_client_buffer() -> usize {
    256
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            heartbeat_secs: default_heartbeat_secs(),
            liveness_timeout_secs: default_liveness_timeout_secs(),
            hub_client_buffer: default_hub_client_buffer(),
        }
    }
}

/// `[jobs]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobsSection {
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Program used to run a command line as `<shell> -c <command>`.
    #[serde(default = "default_shell")]
    pub shell: String,

    #[serde(default)]
    pub change_source: ChangeSourceKind,

    /// Only used with `change_source = "poll"`.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_shell() -> String {
    if cfg!(windows) {
        "cmd".to_string()
    } else {
        "sh".to_string()
    }
}

fn default_poll_interval_ms() -> u64 {
    250
}

impl Default for JobsSection {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            shell: default_shell(),
            change_source: ChangeSourceKind::default(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Validated configuration.
///
/// Only constructible through `TryFrom<RawConfigFile>` (see `validate.rs`),
/// so holders can rely on the invariants checked there.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigFile {
    pub server: ServerSection,
    pub jobs: JobsSection,
    pub locations: BTreeMap<String, PathBuf>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            server: raw.server,
            jobs: raw.jobs,
            locations: raw.locations,
        }
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.server.heartbeat_secs)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_secs(self.server.liveness_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.jobs.poll_interval_ms)
    }

    /// Resolve a requested working directory.
    ///
    /// A value naming a `[locations]` entry maps to that entry's path; any
    /// other value is taken as a path as-is.
    pub fn resolve_location(&self, dir: &str) -> PathBuf {
        match self.locations.get(dir) {
            Some(path) => path.clone(),
            None => PathBuf::from(dir),
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self::new_unchecked(RawConfigFile::default())
    }
}
