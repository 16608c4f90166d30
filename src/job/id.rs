// src/job/id.rs

//! Job identifiers.
//!
//! An ID is the URL-safe, unpadded base64 of `"<command>|<unix nanos>"`. That
//! makes it usable as a file name and as a URL path segment, and lets a
//! finished job be reconstructed from its log file name alone.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{JobtailError, Result};

/// Suffix of every job log file.
pub const LOG_SUFFIX: &str = ".out";

/// Longest file name most filesystems accept.
pub const MAX_FILE_NAME_LEN: usize = 255;

const SEPARATOR: char = '|';

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Encode a command and its creation time.
    ///
    /// Fails only for timestamps outside the range representable in i64
    /// nanoseconds (years 1677 to 2262).
    pub fn encode(command: &str, created_at: DateTime<Utc>) -> Result<Self> {
        let nanos = created_at.timestamp_nanos_opt().ok_or_else(|| {
            JobtailError::invalid(format!("timestamp {created_at} is out of range"))
        })?;
        let raw = format!("{command}{SEPARATOR}{nanos}");
        Ok(JobId(URL_SAFE_NO_PAD.encode(raw.as_bytes())))
    }

    /// Recover the command text and creation time.
    pub fn decode(&self) -> Result<(String, DateTime<Utc>)> {
        let malformed = || JobtailError::invalid(format!("malformed job id '{}'", self.0));

        let bytes = URL_SAFE_NO_PAD.decode(self.0.as_bytes()).map_err(|_| malformed())?;
        let raw = String::from_utf8(bytes).map_err(|_| malformed())?;

        // The command may itself contain the separator; the timestamp never does.
        let (command, nanos) = raw.rsplit_once(SEPARATOR).ok_or_else(malformed)?;
        let nanos: i64 = nanos.parse().map_err(|_| malformed())?;

        Ok((command.to_string(), DateTime::from_timestamp_nanos(nanos)))
    }

    /// Parse an ID coming from outside (URL, file name), checking that it decodes.
    pub fn parse(s: &str) -> Result<Self> {
        let id = JobId(s.to_string());
        id.decode()?;
        Ok(id)
    }

    /// Recognise a log file name and return the ID it encodes.
    pub fn from_log_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(LOG_SUFFIX)?;
        JobId::parse(stem).ok()
    }

    pub fn log_file_name(&self) -> String {
        format!("{}{}", self.0, LOG_SUFFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
