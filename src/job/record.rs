// src/job/record.rs

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::Result;
use crate::job::id::JobId;
use crate::job::log_file::parse_log;
use crate::job::state::JobState;

/// Read-only snapshot of a job, either taken from a live [`Job`](crate::job::Job)
/// or reconstructed from a log file left by an earlier service run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub id: JobId,
    pub command: String,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub working_dir: Option<PathBuf>,
    pub log_path: PathBuf,
    pub error: Option<String>,
    /// True when backed by an in-memory job (it may still be killed or tailed).
    pub live: bool,
}

impl JobRecord {
    /// Rebuild a record from the ID and the text of its log file.
    ///
    /// Command and creation time come from the ID. Without a `Status` footer
    /// line the job is reported as `Completed`.
    pub fn from_log(id: JobId, log_path: PathBuf, contents: &str) -> Result<Self> {
        let (command, created_at) = id.decode()?;
        let summary = parse_log(contents);

        Ok(JobRecord {
            id,
            command,
            state: summary.status.unwrap_or(JobState::Completed),
            created_at,
            started_at: summary.started_at,
            ended_at: summary.ended_at,
            exit_code: summary.exit_code,
            working_dir: None,
            log_path,
            error: None,
            live: false,
        })
    }
}
