// src/hub/broker.rs

//! The hub's coordination loop.
//!
//! Register, unregister and broadcast requests arrive on three channels and
//! are handled one at a time by a single task that exclusively owns the
//! client set. Nothing else ever touches that set, so it needs no lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::errors::{JobtailError, Result};
use crate::hub::client::{ClientId, HubClient};
use crate::hub::message::{Message, Wire};

/// Capacity of each request channel into the loop.
const REQUEST_CAPACITY: usize = 64;

struct Registration {
    client: Arc<dyn HubClient>,
    ack: oneshot::Sender<ClientId>,
}

/// State owned by the coordination task.
pub struct Hub {
    clients: HashMap<ClientId, Arc<dyn HubClient>>,
    next_id: u64,
    client_count: Arc<AtomicUsize>,
    register_rx: mpsc::Receiver<Registration>,
    unregister_rx: mpsc::Receiver<Arc<dyn HubClient>>,
    broadcast_rx: mpsc::Receiver<Wire>,
}

/// Cloneable front door to a running hub.
///
/// The hub shuts down, closing every remaining client, once all handles
/// are dropped.
#[derive(Clone)]
pub struct HubHandle {
    register_tx: mpsc::Sender<Registration>,
    unregister_tx: mpsc::Sender<Arc<dyn HubClient>>,
    broadcast_tx: mpsc::Sender<Wire>,
    client_count: Arc<AtomicUsize>,
}

impl Hub {
    pub fn new() -> (Hub, HubHandle) {
        let (register_tx, register_rx) = mpsc::channel(REQUEST_CAPACITY);
        let (unregister_tx, unregister_rx) = mpsc::channel(REQUEST_CAPACITY);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(REQUEST_CAPACITY);
        let client_count = Arc::new(AtomicUsize::new(0));

        let hub = Hub {
            clients: HashMap::new(),
            next_id: 0,
            client_count: Arc::clone(&client_count),
            register_rx,
            unregister_rx,
            broadcast_rx,
        };
        let handle = HubHandle {
            register_tx,
            unregister_tx,
            broadcast_tx,
            client_count,
        };
        (hub, handle)
    }

    /// Start the coordination loop on the Tokio runtime.
    pub fn spawn() -> HubHandle {
        let (hub, handle) = Hub::new();
        tokio::spawn(hub.run());
        handle
    }

    /// Coordination loop.
    ///
    /// `biased` keeps a registration that was issued before a broadcast
    /// ahead of it, so the new client receives that broadcast.
    pub async fn run(mut self) {
        info!("hub started");

        loop {
            tokio::select! {
                biased;
                Some(registration) = self.register_rx.recv() => {
                    self.handle_register(registration);
                }
                Some(client) = self.unregister_rx.recv() => {
                    self.handle_unregister(client);
                }
                Some(wire) = self.broadcast_rx.recv() => {
                    self.handle_broadcast(wire);
                }
                else => break,
            }
        }

        self.close_all();
        info!("hub stopped");
    }

    fn handle_register(&mut self, Registration { client, ack }: Registration) {
        let id = match client.id() {
            Some(id) => match self.clients.get(&id) {
                Some(existing) if same_client(existing, &client) => {
                    debug!(client = %id, name = client.name(), "client already registered");
                    let _ = ack.send(id);
                    return;
                }
                Some(_) => self.fresh_id(),
                None => {
                    self.next_id = self.next_id.max(id.raw() + 1);
                    id
                }
            },
            None => self.fresh_id(),
        };

        client.assign_id(id);
        self.clients.insert(id, client);
        self.publish_count();
        debug!(client = %id, total = self.clients.len(), "client registered");

        let _ = ack.send(id);
    }

    fn handle_unregister(&mut self, client: Arc<dyn HubClient>) {
        let Some(id) = client.id() else {
            return;
        };
        let registered = self
            .clients
            .get(&id)
            .is_some_and(|existing| same_client(existing, &client));
        if registered {
            self.drop_client(id, "unregistered");
        }
    }

    /// Non-blocking send to every client. Clients that cannot take the
    /// message right now are dropped.
    fn handle_broadcast(&mut self, wire: Wire) {
        let mut dropped = Vec::new();

        for (id, client) in self.clients.iter() {
            match client.send(Arc::clone(&wire)) {
                Ok(()) => trace!(client = %id, name = client.name(), "message queued"),
                Err(TrySendError::Full(_)) => {
                    warn!(client = %id, name = client.name(), "client too slow; dropping it");
                    dropped.push(*id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(client = %id, name = client.name(), "client channel closed; dropping it");
                    dropped.push(*id);
                }
            }
        }

        for id in dropped {
            self.drop_client(id, "dropped");
        }
    }

    fn drop_client(&mut self, id: ClientId, reason: &str) {
        if let Some(client) = self.clients.remove(&id) {
            client.close();
            self.publish_count();
            debug!(client = %id, name = client.name(), reason, "client removed");
        }
    }

    fn close_all(&mut self) {
        for (id, client) in self.clients.drain() {
            debug!(client = %id, name = client.name(), "closing client on hub shutdown");
            client.close();
        }
        self.publish_count();
    }

    /// Next counter value not held by a registered client. Clients may
    /// bring ids from an earlier hub, so the counter alone is not enough.
    fn fresh_id(&mut self) -> ClientId {
        loop {
            let id = ClientId::new(self.next_id);
            self.next_id += 1;
            if !self.clients.contains_key(&id) {
                return id;
            }
        }
    }

    fn publish_count(&self) {
        self.client_count.store(self.clients.len(), Ordering::Relaxed);
    }
}

fn same_client(a: &Arc<dyn HubClient>, b: &Arc<dyn HubClient>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl HubHandle {
    /// Add a client; resolves to the id it is registered under.
    pub async fn register(&self, client: Arc<dyn HubClient>) -> Result<ClientId> {
        let (ack, ack_rx) = oneshot::channel();
        self.register_tx
            .send(Registration { client, ack })
            .await
            .map_err(|_| hub_stopped())?;
        ack_rx.await.map_err(|_| hub_stopped())
    }

    /// Remove a client and close it. Unknown clients are ignored.
    pub async fn unregister(&self, client: Arc<dyn HubClient>) -> Result<()> {
        self.unregister_tx
            .send(client)
            .await
            .map_err(|_| hub_stopped())
    }

    /// Serialise `message` and queue it for every registered client.
    pub async fn broadcast(&self, message: &Message) -> Result<()> {
        let wire = message.to_wire()?;
        self.broadcast_tx
            .send(wire)
            .await
            .map_err(|_| hub_stopped())
    }

    /// Number of registered clients as last published by the loop.
    pub fn client_count(&self) -> usize {
        self.client_count.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for HubHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubHandle")
            .field("clients", &self.client_count())
            .finish_non_exhaustive()
    }
}

fn hub_stopped() -> JobtailError {
    JobtailError::InvalidState("hub has stopped".to_string())
}
