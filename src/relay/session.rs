//! Peer Session Statistics

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

static NEXT_CONNECTION_ID: AtomicUsize = AtomicUsize::new(1);

/// Process-unique identity of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(usize);

impl ConnectionId {
    /// Allocate the next connection id
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn_{}", self.0)
    }
}

/// Byte counters and timing for one connected peer
#[derive(Debug)]
pub struct PeerSession {
    pub connection_id: ConnectionId,
    pub peer_addr: SocketAddr,
    pub start_time: Instant,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
}

/// Snapshot of a session, taken when the peer goes away
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStats {
    pub connection_id: ConnectionId,
    pub peer_addr: SocketAddr,
    pub duration_ms: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

impl PeerSession {
    pub fn new(connection_id: ConnectionId, peer_addr: SocketAddr) -> Self {
        debug!("Creating session {} for {}", connection_id, peer_addr);

        Self {
            connection_id,
            peer_addr,
            start_time: Instant::now(),
            bytes_in: AtomicU64::new(0),
            bytes_out: AtomicU64::new(0),
        }
    }

    /// Bytes received from the peer
    pub fn bytes_in(&self) -> u64 {
        self.bytes_in.load(Ordering::Relaxed)
    }

    /// Bytes broadcast to the peer
    pub fn bytes_out(&self) -> u64 {
        self.bytes_out.load(Ordering::Relaxed)
    }

    pub fn add_bytes_in(&self, bytes: u64) {
        self.bytes_in.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_bytes_out(&self, bytes: u64) {
        self.bytes_out.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn duration(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn to_stats(&self) -> SessionStats {
        SessionStats {
            connection_id: self.connection_id,
            peer_addr: self.peer_addr,
            duration_ms: self.duration().as_millis() as u64,
            bytes_in: self.bytes_in(),
            bytes_out: self.bytes_out(),
        }
    }

    /// Log session statistics
    pub fn log_stats(&self) {
        info!(
            connection_id = %self.connection_id,
            peer = %self.peer_addr,
            duration_ms = self.duration().as_millis() as u64,
            bytes_in = self.bytes_in(),
            bytes_out = self.bytes_out(),
            "Peer session closed"
        );
    }
}
