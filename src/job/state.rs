// src/job/state.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a job.
///
/// ```text
/// Created ──► Running ──► Completed
///    │           ├──────► Killed
///    └───────────┴──────► Failed
/// ```
///
/// Transitions only move forward; a terminal state is never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Created,
    Running,
    Completed,
    Killed,
    /// The log file could not be opened or the process could not be spawned.
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Killed | JobState::Failed
        )
    }

    pub fn can_transition_to(self, next: JobState) -> bool {
        match (self, next) {
            (JobState::Created, JobState::Running | JobState::Failed) => true,
            (JobState::Running, JobState::Completed | JobState::Killed | JobState::Failed) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Created => "created",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Killed => "killed",
            JobState::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "created" => Ok(JobState::Created),
            "running" => Ok(JobState::Running),
            "completed" => Ok(JobState::Completed),
            "killed" => Ok(JobState::Killed),
            "failed" => Ok(JobState::Failed),
            other => Err(format!("invalid job state: {other}")),
        }
    }
}
