// src/server/live.rs

//! WebSocket endpoint for watching a job's log as it is written.

use axum::{
    extract::{
        Path, Query, State,
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt, future};
use serde::Deserialize;

use crate::server::error::{ApiError, ApiResult};
use crate::server::jobs::job_id;
use crate::server::state::AppState;
use crate::session::{Inbound, LiveSession, Outbound};
use crate::tail::Tailer;

#[derive(Debug, Default, Deserialize)]
pub struct LiveParams {
    /// Byte offset the viewer has already displayed. Without it, only
    /// output written after connecting is streamed.
    #[serde(default)]
    pub offset: Option<u64>,
}

/// GET /jobs/{id}/live
///
/// The tailer is opened before the upgrade so a missing log is reported as
/// a plain 404 rather than a socket that closes immediately.
pub async fn live_job(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<LiveParams>,
) -> ApiResult<Response> {
    let id = job_id(&id)?;
    let job = state
        .registry
        .get(&id)
        .ok_or_else(|| ApiError::NotFound(format!("job {id} is not live")))?;

    let tailer = Tailer::open_with(
        job.log_path(),
        params.offset,
        state.config.jobs.change_source,
        state.config.poll_interval(),
    )
    .await?;

    let session = LiveSession::new(job, tailer)
        .with_timing(state.config.heartbeat(), state.config.liveness_timeout());

    Ok(ws.on_upgrade(move |socket| run_session(socket, session)))
}

async fn run_session(socket: WebSocket, session: LiveSession) {
    let (sink, stream) = socket.split();
    let sink = sink.with(|frame: Outbound| future::ready(Ok::<_, axum::Error>(to_frame(frame))));
    let stream = stream.map(|frame| frame.map(from_frame));
    session.run(sink, stream).await;
}

fn to_frame(frame: Outbound) -> WsMessage {
    match frame {
        // A chunk boundary may split a multi-byte character.
        Outbound::Log(bytes) => match String::from_utf8(bytes) {
            Ok(text) => WsMessage::Text(text.into()),
            Err(e) => WsMessage::Binary(e.into_bytes().into()),
        },
        Outbound::Heartbeat => WsMessage::Ping(Default::default()),
        Outbound::Close => WsMessage::Close(None),
    }
}

fn from_frame(frame: WsMessage) -> Inbound {
    match frame {
        WsMessage::Text(text) => Inbound::Text(text.as_str().to_owned()),
        WsMessage::Close(_) => Inbound::Close,
        _ => Inbound::Other,
    }
}
