//! Byte Relay Module
//!
//! Connection registry, broadcast fan-out and the single-byte dispatcher.

pub mod dispatcher;
pub mod registry;
pub mod session;
pub mod sink;

pub use dispatcher::{dispatch, spawn_dispatch, BoxedReader, Destination, DispatchSummary, PumpEnd};
pub use registry::{PeerHandle, Registry};
pub use session::{ConnectionId, PeerSession, SessionStats};
pub use sink::{BoxedWriter, SharedSink};
