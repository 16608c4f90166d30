// src/session/live.rs

//! Bridges one viewer connection to a job's log and its kill switch.
//!
//! Two sibling loops share one cancellation token:
//!
//! - inbound reads control frames; `kill` kills the job and ends the session.
//! - outbound forwards tailer chunks and sends heartbeats.
//!
//! Whichever loop finishes first cancels the other. Teardown always runs the
//! same path: a final flush of unread log bytes, a `Close` frame, and
//! closing the tailer.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::job::{Job, JobState};
use crate::session::protocol::{ControlToken, Inbound, Outbound, SessionEnd};
use crate::tail::Tailer;

pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(54);
pub const DEFAULT_LIVENESS_TIMEOUT: Duration = Duration::from_secs(60);

pub struct LiveSession {
    job: Arc<Job>,
    tailer: Tailer,
    heartbeat: Duration,
    liveness_timeout: Duration,
    cancel: CancellationToken,
}

enum Step {
    Chunk(Result<Option<Vec<u8>>>),
    Heartbeat,
    /// `false` once the job's state can no longer change.
    StateChanged(bool),
    Cancelled,
}

impl LiveSession {
    pub fn new(job: Arc<Job>, tailer: Tailer) -> Self {
        LiveSession {
            job,
            tailer,
            heartbeat: DEFAULT_HEARTBEAT,
            liveness_timeout: DEFAULT_LIVENESS_TIMEOUT,
            cancel: CancellationToken::new(),
        }
    }

    /// Set the keepalive period and how long the viewer may stay silent.
    /// The heartbeat must be shorter than the liveness timeout.
    pub fn with_timing(mut self, heartbeat: Duration, liveness_timeout: Duration) -> Self {
        self.heartbeat = heartbeat;
        self.liveness_timeout = liveness_timeout;
        self
    }

    /// Token that stops the session from outside when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drive the session until either side ends it.
    pub async fn run<S, R, E>(self, sink: S, stream: R) -> SessionEnd
    where
        S: Sink<Outbound> + Unpin + Send,
        S::Error: Display,
        R: Stream<Item = std::result::Result<Inbound, E>> + Unpin + Send,
        E: Display,
    {
        let LiveSession {
            job,
            mut tailer,
            heartbeat,
            liveness_timeout,
            cancel,
        } = self;

        info!(job = %job.id(), watermark = tailer.watermark(), "live session started");

        let (inbound, outbound) = tokio::join!(
            inbound_loop(&job, stream, liveness_timeout, cancel.clone()),
            outbound_loop(&job, &mut tailer, sink, heartbeat, cancel.clone()),
        );
        tailer.close();

        let end = inbound.or(outbound).unwrap_or(SessionEnd::Cancelled);
        info!(job = %job.id(), reason = %end, "live session ended");
        end
    }
}

/// Returns `None` when stopped by the shared token.
async fn inbound_loop<R, E>(
    job: &Job,
    mut stream: R,
    liveness_timeout: Duration,
    cancel: CancellationToken,
) -> Option<SessionEnd>
where
    R: Stream<Item = std::result::Result<Inbound, E>> + Unpin,
    E: Display,
{
    let _guard = cancel.clone().drop_guard();

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return None,
            frame = tokio::time::timeout(liveness_timeout, stream.next()) => frame,
        };

        let frame = match frame {
            Err(_) => {
                warn!(job = %job.id(), ?liveness_timeout, "viewer went silent");
                return Some(SessionEnd::TimedOut);
            }
            Ok(None) | Ok(Some(Ok(Inbound::Close))) => return Some(SessionEnd::ViewerLeft),
            Ok(Some(Err(e))) => {
                debug!(job = %job.id(), error = %e, "viewer read failed");
                return Some(SessionEnd::TransportError(e.to_string()));
            }
            Ok(Some(Ok(frame))) => frame,
        };

        let Inbound::Text(text) = frame else {
            continue;
        };
        match ControlToken::parse(&text) {
            ControlToken::Kill => {
                info!(job = %job.id(), "viewer requested kill");
                job.kill();
                return Some(SessionEnd::Killed);
            }
            ControlToken::Unknown(token) => {
                debug!(job = %job.id(), %token, "ignoring unknown control token");
            }
        }
    }
}

/// Returns `None` when stopped by the shared token.
async fn outbound_loop<S>(
    job: &Job,
    tailer: &mut Tailer,
    mut sink: S,
    heartbeat: Duration,
    cancel: CancellationToken,
) -> Option<SessionEnd>
where
    S: Sink<Outbound> + Unpin,
    S::Error: Display,
{
    let _guard = cancel.clone().drop_guard();

    let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut state_rx: watch::Receiver<JobState> = job.subscribe();

    let mut end = if state_rx.borrow_and_update().is_terminal() {
        Some(SessionEnd::JobFinished)
    } else {
        None
    };

    while end.is_none() {
        let step = tokio::select! {
            _ = cancel.cancelled() => Step::Cancelled,
            _ = ticker.tick() => Step::Heartbeat,
            changed = state_rx.changed() => Step::StateChanged(changed.is_ok()),
            chunk = tailer.next() => Step::Chunk(chunk),
        };

        match step {
            Step::Cancelled => break,
            Step::Heartbeat => {
                if let Err(e) = sink.send(Outbound::Heartbeat).await {
                    warn!(job = %job.id(), error = %e, "heartbeat failed");
                }
            }
            Step::StateChanged(alive) => {
                if !alive || state_rx.borrow_and_update().is_terminal() {
                    end = Some(SessionEnd::JobFinished);
                }
            }
            Step::Chunk(Ok(Some(bytes))) => {
                if let Err(e) = sink.send(Outbound::Log(bytes)).await {
                    debug!(job = %job.id(), error = %e, "log delivery failed");
                    return Some(SessionEnd::TransportError(e.to_string()));
                }
            }
            Step::Chunk(Ok(None)) => break,
            Step::Chunk(Err(e)) => {
                warn!(job = %job.id(), error = %e, "tailer failed");
                end = Some(SessionEnd::TailerError(e.to_string()));
            }
        }
    }

    if !matches!(end, Some(SessionEnd::TailerError(_))) {
        flush(job, tailer, &mut sink).await;
    }
    if let Err(e) = sink.send(Outbound::Close).await {
        debug!(job = %job.id(), error = %e, "close frame not delivered");
    }
    if let Err(e) = sink.close().await {
        debug!(job = %job.id(), error = %e, "closing transport failed");
    }
    end
}

/// Deliver whatever was appended since the last chunk.
async fn flush<S>(job: &Job, tailer: &mut Tailer, sink: &mut S)
where
    S: Sink<Outbound> + Unpin,
    S::Error: Display,
{
    loop {
        match tailer.drain().await {
            Ok(Some(bytes)) => {
                if let Err(e) = sink.send(Outbound::Log(bytes)).await {
                    debug!(job = %job.id(), error = %e, "final flush not delivered");
                    return;
                }
            }
            Ok(None) => return,
            Err(e) => {
                debug!(job = %job.id(), error = %e, "final flush skipped");
                return;
            }
        }
    }
}
