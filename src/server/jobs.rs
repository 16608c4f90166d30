// src/server/jobs.rs

//! Job endpoints: create, list, inspect, kill.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::job::{JobId, JobRecord, JobRegistry};
use crate::server::error::{ApiError, ApiResult};
use crate::server::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateJob {
    pub command: String,
    /// A `[locations]` name or a directory path.
    #[serde(default)]
    pub dir: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedJob {
    pub id: JobId,
}

#[derive(Debug, Serialize)]
pub struct JobDetail {
    pub job: JobRecord,
    /// Full log contents, for jobs that are not running.
    pub log: Option<String>,
}

/// Turn a path segment into a job id. Anything that does not decode cannot
/// name a job.
pub(crate) fn job_id(raw: &str) -> ApiResult<JobId> {
    JobId::parse(raw).map_err(|_| ApiError::NotFound(format!("job {raw}")))
}

/// Run a registry call that reads log files on the blocking pool.
async fn on_registry<T, F>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&JobRegistry) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let registry = Arc::clone(&state.registry);
    let result = tokio::task::spawn_blocking(move || f(&registry))
        .await
        .map_err(|e| ApiError::Internal(format!("registry task failed: {e}")))?;
    Ok(result?)
}

/// POST /jobs
pub async fn create_job(
    State(state): State<AppState>,
    Json(req): Json<CreateJob>,
) -> ApiResult<(StatusCode, Json<CreatedJob>)> {
    let dir = req
        .dir
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(|d| state.config.resolve_location(d));

    tracing::info!(command = %req.command, dir = ?dir, "launching job");

    let job = state.registry.launch(req.command, dir).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedJob {
            id: job.id().clone(),
        }),
    ))
}

/// GET /jobs
pub async fn list_jobs(State(state): State<AppState>) -> ApiResult<Json<Vec<JobRecord>>> {
    let records = on_registry(&state, |registry| Ok(registry.list())).await?;
    Ok(Json(records))
}

/// GET /jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobDetail>> {
    let id = job_id(&id)?;
    let detail = on_registry(&state, move |registry| {
        let job = registry.lookup(&id)?;
        let log = if job.state.is_terminal() {
            match registry.read_log(&id) {
                Ok(log) => Some(log),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e),
            }
        } else {
            None
        };
        Ok(JobDetail { job, log })
    })
    .await?;

    Ok(Json(detail))
}

/// POST /jobs/{id}/kill
pub async fn kill_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = job_id(&id)?;
    let signalled = state.registry.kill(&id)?;
    tracing::debug!(job = %id, signalled, "kill requested over http");
    Ok(StatusCode::ACCEPTED)
}
