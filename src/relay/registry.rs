//! Connection Registry
//!
//! Thread-safe set of live peers that receive broadcast bytes.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::session::{ConnectionId, PeerSession};
use super::sink::SharedSink;

/// The registry-visible side of a connection
#[derive(Debug, Clone)]
pub struct PeerHandle {
    pub session: Arc<PeerSession>,
    pub sink: SharedSink,
}

impl PeerHandle {
    pub fn new(session: Arc<PeerSession>, sink: SharedSink) -> Self {
        Self { session, sink }
    }

    pub fn id(&self) -> ConnectionId {
        self.session.connection_id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.session.peer_addr
    }
}

/// Set of connections eligible for broadcast, keyed by connection id.
///
/// Cloning is cheap and every clone shares the same membership.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    clients: Arc<Mutex<HashMap<ConnectionId, PeerHandle>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer as a broadcast target
    pub async fn add(&self, peer: PeerHandle) {
        let id = peer.id();
        self.clients.lock().await.insert(id, peer);
        debug!(connection_id = %id, "Client registered");
    }

    /// Unregister a peer; no-op if it is not present
    pub async fn remove(&self, id: ConnectionId) {
        if self.clients.lock().await.remove(&id).is_some() {
            debug!(connection_id = %id, "Client unregistered");
        }
    }

    /// Write `byte` to every registered peer under a single lock hold.
    ///
    /// Peers whose write fails are evicted before the lock is released.
    pub async fn broadcast(&self, byte: u8) {
        let mut clients = self.clients.lock().await;

        let mut failed = Vec::new();
        for (id, peer) in clients.iter() {
            match peer.sink.write_byte(byte).await {
                Ok(()) => peer.session.add_bytes_out(1),
                Err(e) => {
                    warn!(connection_id = %id, peer = %peer.peer_addr(), "Broadcast write failed: {}", e);
                    failed.push(*id);
                }
            }
        }

        for id in failed {
            clients.remove(&id);
        }
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.clients.lock().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.lock().await.is_empty()
    }
}
