// src/job/registry.rs

//! Process-wide directory of jobs.
//!
//! In-memory entries are inserted on creation and never evicted. Jobs from
//! earlier service runs exist only as log files and are reconstructed on
//! demand in read-only form.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::ConfigFile;
use crate::errors::{JobtailError, Result};
use crate::fs::{FileSystem, RealFileSystem};
use crate::hub::{HubHandle, Message};
use crate::job::id::JobId;
use crate::job::lifecycle::{default_shell, Job, JobRun};
use crate::job::record::JobRecord;
use crate::job::state::JobState;

/// Hub message type used for job lifecycle notifications.
pub const JOB_EVENT_TYPE: &str = "job";

/// Bytes read from each end of a log when rebuilding a record. Headers and
/// footers are a few hundred bytes at most.
const SUMMARY_BYTES: usize = 4096;

pub struct JobRegistry {
    log_dir: PathBuf,
    shell: String,
    fs: Arc<dyn FileSystem>,
    jobs: RwLock<HashMap<JobId, Arc<Job>>>,
    events: Option<HubHandle>,
}

impl JobRegistry {
    pub fn new(log_dir: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            log_dir: log_dir.into(),
            shell: default_shell(),
            fs,
            jobs: RwLock::new(HashMap::new()),
            events: None,
        }
    }

    pub fn from_config(cfg: &ConfigFile, events: Option<HubHandle>) -> Self {
        let mut registry = Self::new(cfg.jobs.log_dir.clone(), Arc::new(RealFileSystem))
            .with_shell(cfg.jobs.shell.clone());
        registry.events = events;
        registry
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Publish job lifecycle messages on the given hub.
    pub fn with_events(mut self, hub: HubHandle) -> Self {
        self.events = Some(hub);
        self
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Make sure the log directory exists.
    pub fn prepare(&self) -> Result<()> {
        self.fs.create_dir_all(&self.log_dir)?;
        Ok(())
    }

    /// Create a job and remember it, without starting it.
    pub fn create(
        &self,
        command: impl Into<String>,
        working_dir: Option<PathBuf>,
    ) -> Result<Arc<Job>> {
        let job = Arc::new(
            Job::create(command, working_dir, &self.log_dir)?.with_shell(self.shell.clone()),
        );
        self.write().insert(job.id().clone(), Arc::clone(&job));
        debug!(job = %job.id(), "job registered");
        Ok(job)
    }

    /// Create, register and start a job.
    ///
    /// A job that fails to start stays registered in the `Failed` state and
    /// the error is returned.
    pub async fn launch(
        &self,
        command: impl Into<String>,
        working_dir: Option<PathBuf>,
    ) -> Result<Arc<Job>> {
        let job = self.create(command, working_dir)?;

        match job.start().await {
            Ok(run) => {
                publish(self.events.as_ref(), &job.record(), "started").await;
                self.follow(Arc::clone(&job), run);
                Ok(job)
            }
            Err(err) => {
                publish(self.events.as_ref(), &job.record(), "failed").await;
                Err(err)
            }
        }
    }

    /// Announce the job's terminal state once its process exits.
    fn follow(&self, job: Arc<Job>, run: JobRun) {
        let events = self.events.clone();
        tokio::spawn(async move {
            match run.wait().await {
                Ok(outcome) => {
                    publish(events.as_ref(), &job.record(), outcome.state.as_str()).await;
                }
                Err(e) => warn!(job = %job.id(), error = %e, "lost track of job"),
            }
        });
    }

    pub fn get(&self, id: &JobId) -> Option<Arc<Job>> {
        self.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Current record of a job, from memory or from its log file.
    pub fn lookup(&self, id: &JobId) -> Result<JobRecord> {
        if let Some(job) = self.get(id) {
            return Ok(job.record());
        }

        let path = self.log_path(id);
        if !self.fs.is_file(&path) {
            return Err(JobtailError::not_found(format!("job {id}")));
        }
        let contents = self.fs.read_ends(&path, SUMMARY_BYTES)?;
        JobRecord::from_log(id.clone(), path, &contents)
    }

    /// Full persisted log contents.
    pub fn read_log(&self, id: &JobId) -> Result<String> {
        let path = match self.get(id) {
            Some(job) => job.log_path().to_path_buf(),
            None => self.log_path(id),
        };
        if !self.fs.is_file(&path) {
            return Err(JobtailError::not_found(format!("log of job {id}")));
        }
        Ok(self.fs.read_to_string(&path)?)
    }

    /// Every known job, newest first.
    ///
    /// Touches the filesystem synchronously; async callers should run it on
    /// the blocking pool.
    pub fn list(&self) -> Vec<JobRecord> {
        let mut records: Vec<JobRecord> = self.read().values().map(|job| job.record()).collect();

        let entries = match self.fs.read_dir(&self.log_dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %self.log_dir.display(), error = %e, "log directory not readable");
                Vec::new()
            }
        };

        for path in entries {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(id) = JobId::from_log_file_name(name) else {
                warn!(file = %path.display(), "skipping file that is not a job log");
                continue;
            };
            if self.read().contains_key(&id) {
                continue;
            }
            match self
                .fs
                .read_ends(&path, SUMMARY_BYTES)
                .map_err(JobtailError::from)
                .and_then(|contents| JobRecord::from_log(id, path.clone(), &contents))
            {
                Ok(record) => records.push(record),
                Err(e) => warn!(file = %path.display(), error = %e, "skipping unreadable job log"),
            }
        }

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    /// Kill a job. Jobs only known from disk are never running.
    pub fn kill(&self, id: &JobId) -> Result<bool> {
        match self.get(id) {
            Some(job) => Ok(job.kill()),
            None if self.fs.is_file(&self.log_path(id)) => Ok(false),
            None => Err(JobtailError::not_found(format!("job {id}"))),
        }
    }

    /// Close every in-memory job, killing those still running.
    ///
    /// Returns how many were running.
    pub fn shutdown(&self) -> usize {
        let jobs: Vec<Arc<Job>> = self.read().values().cloned().collect();
        let mut running = 0;
        for job in jobs {
            if job.state() == JobState::Running {
                running += 1;
            }
            job.close();
        }
        info!(running, "job registry shut down");
        running
    }

    /// Wait until no in-memory job is running, so that killed jobs get
    /// their footers written. Gives up after `limit`; returns whether every
    /// job settled.
    pub async fn settle(&self, limit: Duration) -> bool {
        let jobs: Vec<Arc<Job>> = self.read().values().cloned().collect();
        let all = async move {
            for job in jobs {
                let mut state = job.subscribe();
                let _ = state.wait_for(|s| *s != JobState::Running).await;
            }
        };
        match tokio::time::timeout(limit, all).await {
            Ok(()) => true,
            Err(_) => {
                warn!(?limit, "jobs still running after shutdown grace period");
                false
            }
        }
    }

    fn log_path(&self, id: &JobId) -> PathBuf {
        self.log_dir.join(id.log_file_name())
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, Arc<Job>>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, Arc<Job>>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("log_dir", &self.log_dir)
            .field("jobs", &self.len())
            .finish_non_exhaustive()
    }
}

async fn publish(events: Option<&HubHandle>, record: &JobRecord, action: &str) {
    let Some(hub) = events else {
        return;
    };

    let message = match serde_json::to_value(record) {
        Ok(data) => Message::new(JOB_EVENT_TYPE, action)
            .with_text(record.id.as_str())
            .with_data(data),
        Err(e) => {
            warn!(job = %record.id, error = %e, "could not serialise job record");
            return;
        }
    };

    if let Err(e) = hub.broadcast(&message).await {
        debug!(job = %record.id, error = %e, "job event not published");
    }
}
