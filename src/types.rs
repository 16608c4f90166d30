use std::str::FromStr;
use serde::{Deserialize, Serialize};

/// How a tailer learns that a log file has grown.
///
/// - `Notify`: OS filesystem notifications via the `notify` crate (default).
/// - `Poll`: re-stat the file on a fixed interval. Useful on network mounts
///   and in containers where inotify events are not delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeSourceKind {
    Notify,
    Poll,
}

impl Default for ChangeSourceKind {
    fn default() -> Self {
        ChangeSourceKind::Notify
    }
}

impl FromStr for ChangeSourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "notify" => Ok(ChangeSourceKind::Notify),
            "poll" => Ok(ChangeSourceKind::Poll),
            other => Err(format!(
                "invalid change_source: {other} (expected \"notify\" or \"poll\")"
            )),
        }
    }
}
