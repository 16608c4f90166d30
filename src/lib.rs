// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod fs;
pub mod hub;
pub mod job;
pub mod logging;
pub mod server;
pub mod session;
pub mod tail;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, load_raw_or_default};
use crate::hub::Hub;
use crate::job::JobRegistry;
use crate::server::AppState;

/// How long shutdown waits for killed jobs to write their footers.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading (file, then CLI overrides, then validation)
/// - the hub and the job registry
/// - the HTTP server
/// - Ctrl-C handling, which stops the server and kills running jobs
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = resolve_config(&args)?;

    if args.check {
        print_config(&cfg)?;
        return Ok(());
    }

    let hub = Hub::spawn();
    let registry = Arc::new(JobRegistry::from_config(&cfg, Some(hub.clone())));
    registry
        .prepare()
        .with_context(|| format!("preparing log directory {}", registry.log_dir().display()))?;

    let listener = TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("binding {}", cfg.server.bind))?;

    let state = AppState::new(Arc::clone(&registry), hub, cfg);
    server::serve(listener, state, shutdown_signal()).await?;

    let running = registry.shutdown();
    if running > 0 {
        info!(running, "waiting for killed jobs to finish");
        registry.settle(SHUTDOWN_GRACE).await;
    }
    Ok(())
}

/// Load the config file, apply CLI overrides and validate the result.
pub fn resolve_config(args: &CliArgs) -> Result<ConfigFile> {
    let mut raw = load_raw_or_default(args.config.as_deref())?;

    if let Some(bind) = &args.bind {
        raw.server.bind = bind.clone();
    }
    if let Some(dir) = &args.log_dir {
        raw.jobs.log_dir = dir.clone();
    }

    Ok(ConfigFile::try_from(raw)?)
}

fn print_config(cfg: &ConfigFile) -> Result<()> {
    println!("jobtail config OK");
    println!();
    print!("{}", toml::to_string(cfg).context("rendering config")?);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl+C; shutdown only by termination");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
