// src/logging.rs

//! Diagnostics for the `jobtail` service itself.
//!
//! Job output never passes through here: each job's stdout and stderr go
//! straight into its own log file. What this module configures is the
//! service's trace of what it is doing (HTTP requests, job lifecycle, tailer
//! and hub activity), written to STDERR.
//!
//! Level selection:
//! 1. `--log-level` CLI flag (applies to `jobtail` and request tracing)
//! 2. `JOBTAIL_LOG`, either a bare level ("debug") or a full filter
//!    directive ("jobtail::tail=trace,tower_http=debug")
//! 3. `info` for `jobtail` and request tracing, `warn` for everything else

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use crate::cli::LogLevel;

/// Environment variable holding a level or filter directive.
pub const LOG_ENV: &str = "JOBTAIL_LOG";

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env = std::env::var(LOG_ENV).ok();
    let filter = build_filter(cli_level, env.as_deref());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("installing tracing subscriber: {e}"))?;

    Ok(())
}

pub(crate) fn build_filter(cli_level: Option<LogLevel>, env: Option<&str>) -> EnvFilter {
    if let Some(lvl) = cli_level {
        return service_filter(level_from_log_level(lvl));
    }
    match env.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => match parse_level_str(raw) {
            Some(level) => service_filter(level),
            None => EnvFilter::try_new(raw).unwrap_or_else(|e| {
                eprintln!("ignoring invalid {LOG_ENV} value {raw:?}: {e}");
                service_filter(tracing::Level::INFO)
            }),
        },
        None => service_filter(tracing::Level::INFO),
    }
}

/// `level` for the service and its request traces; dependencies stay at warn.
fn service_filter(level: tracing::Level) -> EnvFilter {
    let level = level.as_str().to_lowercase();
    EnvFilter::new(format!("warn,jobtail={level},tower_http={level}"))
}

fn level_from_log_level(lvl: LogLevel) -> tracing::Level {
    match lvl {
        LogLevel::Error => tracing::Level::ERROR,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Trace => tracing::Level::TRACE,
    }
}

pub(crate) fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directives(filter: EnvFilter) -> Vec<String> {
        let mut parts: Vec<String> = filter.to_string().split(',').map(str::to_string).collect();
        parts.sort();
        parts
    }

    #[test]
    fn cli_flag_wins_over_environment() {
        let filter = build_filter(Some(LogLevel::Debug), Some("trace"));
        assert_eq!(directives(filter), ["jobtail=debug", "tower_http=debug", "warn"]);
    }

    #[test]
    fn bare_level_scopes_to_the_service() {
        let filter = build_filter(None, Some(" Warning "));
        assert_eq!(directives(filter), ["jobtail=warn", "tower_http=warn", "warn"]);
    }

    #[test]
    fn directives_pass_through() {
        let filter = build_filter(None, Some("jobtail::tail=trace"));
        assert_eq!(directives(filter), ["jobtail::tail=trace"]);
    }

    #[test]
    fn defaults_to_info() {
        let filter = build_filter(None, None);
        assert_eq!(directives(filter), ["jobtail=info", "tower_http=info", "warn"]);
        assert_eq!(parse_level_str("verbose"), None);
    }
}
