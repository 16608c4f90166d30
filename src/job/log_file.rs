// src/job/log_file.rs

//! Layout of a persisted job log.
//!
//! ```text
//! Start:2026-10-17T09:12:44Z
//! Command:echo hello
//!
//! hello                       <- raw interleaved stdout/stderr
//!
//! End:2026-10-17T09:12:44Z
//! Elapsed:0.004s
//! Exit:0                      <- omitted when the process died from a signal
//! Status:completed            <- or "killed" / "failed"
//! ```

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::job::state::JobState;

const START_KEY: &str = "Start:";
const COMMAND_KEY: &str = "Command:";
const END_KEY: &str = "End:";
const ELAPSED_KEY: &str = "Elapsed:";
const EXIT_KEY: &str = "Exit:";
const STATUS_KEY: &str = "Status:";

/// Footer lines are searched for only in this many trailing lines.
const FOOTER_LINES: usize = 4;

pub fn render_header(started_at: DateTime<Utc>, command: &str) -> String {
    format!(
        "{START_KEY}{}\n{COMMAND_KEY}{}\n\n",
        format_time(started_at),
        command
    )
}

/// Completion record appended once the process has exited.
#[derive(Debug, Clone, PartialEq)]
pub struct Footer {
    pub ended_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub exit_code: Option<i32>,
    pub status: JobState,
}

impl Footer {
    pub fn render(&self) -> String {
        let mut out = format!(
            "\n{END_KEY}{}\n{ELAPSED_KEY}{:.3}s\n",
            format_time(self.ended_at),
            self.elapsed.as_secs_f64()
        );
        if let Some(code) = self.exit_code {
            out.push_str(&format!("{EXIT_KEY}{code}\n"));
        }
        out.push_str(&format!("{STATUS_KEY}{}\n", self.status));
        out
    }
}

/// What could be recovered from a log file's text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogSummary {
    pub started_at: Option<DateTime<Utc>>,
    pub command: Option<String>,
    pub ended_at: Option<DateTime<Utc>>,
    pub elapsed: Option<Duration>,
    pub exit_code: Option<i32>,
    pub status: Option<JobState>,
}

pub fn parse_log(contents: &str) -> LogSummary {
    let mut summary = LogSummary::default();

    for line in contents.lines().take(2) {
        if let Some(ts) = line.strip_prefix(START_KEY) {
            summary.started_at = parse_time(ts);
        } else if let Some(cmd) = line.strip_prefix(COMMAND_KEY) {
            summary.command = Some(cmd.to_string());
        }
    }

    for line in contents.lines().rev().take(FOOTER_LINES) {
        if let Some(ts) = line.strip_prefix(END_KEY) {
            summary.ended_at = parse_time(ts);
        } else if let Some(secs) = line.strip_prefix(ELAPSED_KEY) {
            summary.elapsed = secs
                .trim_end_matches('s')
                .parse::<f64>()
                .ok()
                .and_then(|s| Duration::try_from_secs_f64(s).ok());
        } else if let Some(code) = line.strip_prefix(EXIT_KEY) {
            summary.exit_code = code.trim().parse().ok();
        } else if let Some(status) = line.strip_prefix(STATUS_KEY) {
            summary.status = status.parse().ok();
        }
    }

    // A Status line without an End line is process output, not a footer.
    if summary.ended_at.is_none() {
        summary.elapsed = None;
        summary.exit_code = None;
        summary.status = None;
    }

    summary
}

fn format_time(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}
