// src/job/lifecycle.rs

//! A single managed invocation of a shell command.
//!
//! The job owns its child process and its open log file while `Running`.
//! Both are released by the supervisor task returned from [`Job::start`]
//! once the process has exited.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::{JobtailError, Result};
use crate::job::id::{JobId, MAX_FILE_NAME_LEN};
use crate::job::log_file::{Footer, render_header};
use crate::job::record::JobRecord;
use crate::job::state::JobState;

/// Shell used when none is configured.
pub fn default_shell() -> String {
    if cfg!(windows) {
        "cmd".to_string()
    } else {
        "sh".to_string()
    }
}

fn shell_flag(shell: &str) -> &'static str {
    let name = Path::new(shell)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(shell);
    if name.eq_ignore_ascii_case("cmd") { "/C" } else { "-c" }
}

pub struct Job {
    id: JobId,
    command: String,
    working_dir: Option<PathBuf>,
    created_at: DateTime<Utc>,
    log_path: PathBuf,
    shell: String,
    state: watch::Sender<JobState>,
    kill: CancellationToken,
    inner: Mutex<JobInner>,
}

#[derive(Debug, Default)]
struct JobInner {
    start_claimed: bool,
    closed: bool,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    exit_code: Option<i32>,
    error: Option<String>,
}

/// How a started job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOutcome {
    pub state: JobState,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub elapsed: Duration,
}

/// Handle on the supervisor task of a running job.
///
/// Awaiting it is optional; the job's state is the externally visible
/// progress signal.
#[derive(Debug)]
pub struct JobRun {
    id: JobId,
    handle: JoinHandle<JobOutcome>,
}

impl JobRun {
    pub async fn wait(self) -> Result<JobOutcome> {
        let id = self.id;
        self.handle.await.map_err(|e| {
            JobtailError::Other(anyhow::anyhow!("supervisor task of job {id} failed: {e}"))
        })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Job {
    /// Create a job without starting it.
    ///
    /// The log file will be `<log_dir>/<id>.out`.
    pub fn create(
        command: impl Into<String>,
        working_dir: Option<PathBuf>,
        log_dir: impl AsRef<Path>,
    ) -> Result<Self> {
        let command = command.into();
        if command.trim().is_empty() {
            return Err(JobtailError::invalid("command must not be empty"));
        }

        let created_at = Utc::now();
        let id = JobId::encode(&command, created_at)?;
        let file_name = id.log_file_name();
        if file_name.len() > MAX_FILE_NAME_LEN {
            return Err(JobtailError::invalid(format!(
                "command is too long to name its log file ({} bytes encoded, max {})",
                file_name.len(),
                MAX_FILE_NAME_LEN
            )));
        }

        let (state, _) = watch::channel(JobState::Created);

        Ok(Job {
            log_path: log_dir.as_ref().join(file_name),
            id,
            command,
            working_dir,
            created_at,
            shell: default_shell(),
            state,
            kill: CancellationToken::new(),
            inner: Mutex::new(JobInner::default()),
        })
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn state(&self) -> JobState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<JobState> {
        self.state.subscribe()
    }

    pub fn error(&self) -> Option<String> {
        self.inner().error.clone()
    }

    pub fn record(&self) -> JobRecord {
        let inner = self.inner();
        JobRecord {
            id: self.id.clone(),
            command: self.command.clone(),
            state: self.state(),
            created_at: self.created_at,
            started_at: inner.started_at,
            ended_at: inner.ended_at,
            exit_code: inner.exit_code,
            working_dir: self.working_dir.clone(),
            log_path: self.log_path.clone(),
            error: inner.error.clone(),
            live: true,
        }
    }

    /// Open the log, write its header, spawn the process.
    ///
    /// Returns once the process is running; the returned [`JobRun`] resolves
    /// when it has exited and the footer is written. Log and spawn failures
    /// are returned here and leave the job `Failed`.
    pub async fn start(self: &Arc<Self>) -> Result<JobRun> {
        self.claim_start()?;

        let started_at = Utc::now();
        let clock = Instant::now();

        let log = match self.open_log(started_at).await {
            Ok(log) => log,
            Err(err) => {
                self.fail(&err);
                return Err(err);
            }
        };

        self.inner().started_at = Some(started_at);
        self.transition(JobState::Running);

        let child = match self.spawn_process(&log) {
            Ok(child) => child,
            Err(err) => {
                let footer = Footer {
                    ended_at: Utc::now(),
                    elapsed: clock.elapsed(),
                    exit_code: None,
                    status: JobState::Failed,
                };
                self.write_footer(log, &footer).await;
                self.inner().ended_at = Some(footer.ended_at);
                self.fail(&err);
                return Err(err);
            }
        };

        info!(
            job = %self.id,
            pid = ?child.id(),
            cmd = %self.command,
            "job process started"
        );

        let job = Arc::clone(self);
        let handle = tokio::spawn(async move { job.supervise(child, log, clock).await });

        Ok(JobRun {
            id: self.id.clone(),
            handle,
        })
    }

    /// Ask a running job's process to terminate.
    ///
    /// Returns false (and does nothing) when the job is not running.
    pub fn kill(&self) -> bool {
        let state = self.state();
        if state != JobState::Running {
            debug!(job = %self.id, %state, "kill ignored; job is not running");
            return false;
        }
        info!(job = %self.id, "kill requested");
        self.kill.cancel();
        true
    }

    /// Idempotent cleanup: kills the process if running and prevents a later
    /// start.
    pub fn close(&self) {
        {
            let mut inner = self.inner();
            if inner.closed {
                return;
            }
            inner.closed = true;
        }
        debug!(job = %self.id, "closing job");
        if self.state() == JobState::Running {
            self.kill();
        }
    }

    fn claim_start(&self) -> Result<()> {
        let mut inner = self.inner();
        if inner.closed {
            return Err(JobtailError::InvalidState(format!(
                "job {} is closed",
                self.id
            )));
        }
        if inner.start_claimed {
            return Err(JobtailError::InvalidState(format!(
                "job {} was already started",
                self.id
            )));
        }
        inner.start_claimed = true;
        Ok(())
    }

    async fn open_log(&self, started_at: DateTime<Utc>) -> Result<std::fs::File> {
        let path = &self.log_path;
        let annotate = |e: io::Error| {
            JobtailError::Io(io::Error::new(
                e.kind(),
                format!("log file {}: {e}", path.display()),
            ))
        };

        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(annotate)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(annotate)?;

        file.write_all(render_header(started_at, &self.command).as_bytes())
            .await
            .map_err(annotate)?;
        file.flush().await.map_err(annotate)?;

        Ok(file.into_std().await)
    }

    fn spawn_process(&self, log: &std::fs::File) -> Result<Child> {
        let stdout = log.try_clone()?;
        let stderr = log.try_clone()?;

        let mut cmd = Command::new(&self.shell);
        cmd.arg(shell_flag(&self.shell))
            .arg(&self.command)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        cmd.spawn().map_err(|source| JobtailError::Spawn {
            command: self.command.clone(),
            source,
        })
    }

    /// Wait for the process (or a kill request), then write the footer and
    /// record the terminal state.
    async fn supervise(
        self: Arc<Self>,
        mut child: Child,
        log: std::fs::File,
        clock: Instant,
    ) -> JobOutcome {
        // An exit that is already in counts even if a kill arrived too.
        let (status, killed) = tokio::select! {
            biased;
            status = child.wait() => (status, false),
            _ = self.kill.cancelled() => {
                info!(job = %self.id, "terminating job process");
                if let Err(e) = child.start_kill() {
                    warn!(job = %self.id, error = %e, "failed to signal job process");
                }
                (child.wait().await, true)
            }
        };

        let exit_code = match status {
            Ok(status) => {
                info!(
                    job = %self.id,
                    exit_code = ?status.code(),
                    success = status.success(),
                    killed,
                    "job process exited"
                );
                status.code()
            }
            Err(e) => {
                warn!(job = %self.id, error = %e, "waiting for job process failed");
                None
            }
        };

        let final_state = if killed {
            JobState::Killed
        } else {
            JobState::Completed
        };
        let footer = Footer {
            ended_at: Utc::now(),
            elapsed: clock.elapsed(),
            exit_code,
            status: final_state,
        };
        self.write_footer(log, &footer).await;

        {
            let mut inner = self.inner();
            inner.ended_at = Some(footer.ended_at);
            inner.exit_code = exit_code;
        }
        self.transition(final_state);

        JobOutcome {
            state: final_state,
            exit_code,
            elapsed: footer.elapsed,
        }
    }

    /// Append the footer and close the log.
    async fn write_footer(&self, log: std::fs::File, footer: &Footer) {
        let mut file = tokio::fs::File::from_std(log);
        let result = async {
            file.write_all(footer.render().as_bytes()).await?;
            file.flush().await
        }
        .await;
        if let Err(e) = result {
            error!(
                job = %self.id,
                path = %self.log_path.display(),
                error = %e,
                "failed to write log footer"
            );
        }
    }

    fn fail(&self, err: &JobtailError) {
        error!(job = %self.id, error = %err, "job failed to start");
        self.inner().error = Some(err.to_string());
        self.transition(JobState::Failed);
    }

    fn transition(&self, next: JobState) -> bool {
        let mut previous = None;
        let changed = self.state.send_if_modified(|state| {
            if state.can_transition_to(next) {
                previous = Some(*state);
                *state = next;
                true
            } else {
                false
            }
        });

        if changed {
            debug!(job = %self.id, from = ?previous, to = %next, "job state changed");
        } else {
            warn!(job = %self.id, to = %next, current = %self.state(), "ignoring backward state transition");
        }
        changed
    }

    fn inner(&self) -> MutexGuard<'_, JobInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("command", &self.command)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
