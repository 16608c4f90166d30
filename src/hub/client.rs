// src/hub/client.rs

//! What the hub needs from a client.
//!
//! The hub never knows the concrete kind of a client; anything implementing
//! [`HubClient`] can be registered. [`ChannelClient`] is the stock
//! implementation used for WebSocket viewers.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::debug;

use crate::hub::message::Wire;

/// Identifier assigned by the hub on first registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    pub(crate) fn new(raw: u64) -> Self {
        ClientId(raw)
    }

    pub(crate) fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ID{}", self.0)
    }
}

pub trait HubClient: Send + Sync {
    /// `None` until the client has been registered once.
    fn id(&self) -> Option<ClientId>;

    /// Called by the hub when it assigns an identifier. A client that
    /// arrives with an id another client holds is given a new one, which
    /// replaces the old.
    fn assign_id(&self, id: ClientId);

    /// Human-readable label, used in logs.
    fn name(&self) -> &str;

    /// Buffered channel the hub pushes broadcasts into.
    fn outbound(&self) -> &mpsc::Sender<Wire>;

    /// Non-blocking delivery; fails when the channel is full or closed.
    fn send(&self, wire: Wire) -> Result<(), TrySendError<Wire>> {
        self.outbound().try_send(wire)
    }

    /// Release the client. Called by the hub exactly once, on unregistration.
    fn close(&self);
}

/// A client backed by a bounded mpsc channel.
///
/// The consumer owns the receiving half and should stop reading once
/// [`ChannelClient::closed`] resolves.
pub struct ChannelClient {
    name: String,
    id: Mutex<Option<ClientId>>,
    tx: mpsc::Sender<Wire>,
    closed: CancellationToken,
}

impl ChannelClient {
    pub fn new(name: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<Wire>) {
        let (tx, rx) = mpsc::channel(capacity);
        let client = ChannelClient {
            name: name.into(),
            id: Mutex::new(None),
            tx,
            closed: CancellationToken::new(),
        };
        (client, rx)
    }

    /// Resolves once the hub has closed this client.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

impl HubClient for ChannelClient {
    fn id(&self) -> Option<ClientId> {
        *self.id.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn assign_id(&self, id: ClientId) {
        let previous = self
            .id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(id);
        if let Some(previous) = previous.filter(|p| *p != id) {
            debug!(client = %self.name, %previous, %id, "client id replaced");
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn outbound(&self) -> &mpsc::Sender<Wire> {
        &self.tx
    }

    fn close(&self) {
        self.closed.cancel();
    }
}

impl fmt::Debug for ChannelClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelClient")
            .field("name", &self.name)
            .field("id", &self.id())
            .field("closed", &self.is_closed())
            .finish()
    }
}
