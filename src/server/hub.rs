// src/server/hub.rs

//! WebSocket endpoint that attaches a browser to the hub.
//!
//! Every broadcast is forwarded as a text frame. Text frames from the
//! browser are parsed as hub messages, stamped with the client's id as
//! `sender` and broadcast to everyone, the sender included.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::hub::{ChannelClient, HubClient, Message};
use crate::server::state::AppState;

/// GET /hub
pub async fn hub_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_client(socket, state))
}

async fn serve_client(socket: WebSocket, state: AppState) {
    let (client, mut rx) = ChannelClient::new("websocket", state.config.server.hub_client_buffer);
    let client = Arc::new(client);

    let id = match state.hub.register(client.clone()).await {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "hub client rejected");
            return;
        }
    };
    info!(client = %id, "hub client connected");

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            _ = client.closed() => {
                debug!(client = %id, "hub dropped client");
                break;
            }
            wire = rx.recv() => {
                let Some(wire) = wire else { break };
                if let Err(e) = sink.send(WsMessage::Text(wire.to_string().into())).await {
                    debug!(client = %id, error = %e, "hub client send failed");
                    break;
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => match Message::from_wire(text.as_str()) {
                    Ok(message) => {
                        let message = message.with_sender(id.to_string());
                        if let Err(e) = state.hub.broadcast(&message).await {
                            warn!(client = %id, error = %e, "broadcast failed");
                            break;
                        }
                    }
                    Err(e) => debug!(client = %id, error = %e, "ignoring malformed hub message"),
                },
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(client = %id, error = %e, "hub client read failed");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    if !client.is_closed() {
        if let Err(e) = state.hub.unregister(client.clone()).await {
            debug!(client = %id, error = %e, "unregister failed");
        }
    }
    let _ = sink.send(WsMessage::Close(None)).await;
    info!(client = %id, name = client.name(), "hub client disconnected");
}
