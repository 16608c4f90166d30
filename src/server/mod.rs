// src/server/mod.rs

//! HTTP and WebSocket surface.

pub mod error;
pub mod health;
pub mod hub;
pub mod jobs;
pub mod live;
pub mod state;

use std::future::Future;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::errors::Result;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        // Jobs
        .route("/jobs", get(jobs::list_jobs).post(jobs::create_job))
        .route("/jobs/{id}", get(jobs::get_job))
        .route("/jobs/{id}/kill", post(jobs::kill_job))
        .route("/jobs/{id}/live", get(live::live_job))
        // Hub
        .route("/hub", get(hub::hub_socket))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serve until `shutdown` resolves, then stop accepting connections and
/// let in-flight requests finish.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
