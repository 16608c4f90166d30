#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use jobtail::hub::{ClientId, HubClient, Message, Wire};
use tokio::sync::mpsc;

/// Hub client that counts how often it was closed.
///
/// The receiving half of its channel stays with the test, which decides
/// whether to drain it (a healthy client) or leave it full (a slow one).
pub struct RecordingClient {
    name: String,
    id: Mutex<Option<ClientId>>,
    tx: mpsc::Sender<Wire>,
    closes: AtomicUsize,
}

impl RecordingClient {
    pub fn new(name: &str, capacity: usize) -> (Arc<Self>, mpsc::Receiver<Wire>) {
        let (tx, rx) = mpsc::channel(capacity);
        let client = RecordingClient {
            name: name.to_string(),
            id: Mutex::new(None),
            tx,
            closes: AtomicUsize::new(0),
        };
        (Arc::new(client), rx)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl HubClient for RecordingClient {
    fn id(&self) -> Option<ClientId> {
        *self.id.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn assign_id(&self, id: ClientId) {
        *self.id.lock().unwrap_or_else(PoisonError::into_inner) = Some(id);
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn outbound(&self) -> &mpsc::Sender<Wire> {
        &self.tx
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Everything currently buffered for a client, decoded.
pub fn drain_messages(rx: &mut mpsc::Receiver<Wire>) -> Vec<Message> {
    let mut out = Vec::new();
    while let Ok(wire) = rx.try_recv() {
        out.push(Message::from_wire(&wire).expect("hub wire is valid json"));
    }
    out
}
