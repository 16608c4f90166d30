// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `jobtail`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "jobtail",
    version,
    about = "Run shell commands as background jobs and stream their logs live.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Jobtail.toml` in the current working directory, falling
    /// back to built-in defaults when that file does not exist.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Listen address, overriding `[server].bind`.
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,

    /// Directory for job log files, overriding `[jobs].log_dir`.
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `JOBTAIL_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Load and validate the config, print it, and exit without serving.
    #[arg(long)]
    pub check: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
