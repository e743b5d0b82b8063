//! netpipe Library
//!
//! Relays raw bytes between every connected network peer and either the
//! local terminal or a spawned subprocess. Input from any peer goes to the
//! shared sink; local output is broadcast to every live peer.

pub mod config;
pub mod connection;
pub mod process;
pub mod relay;
pub mod shutdown;

pub use config::Config;
pub use connection::{Connection, ConnectionManager};
pub use process::StdioHub;
pub use relay::Registry;
pub use shutdown::ShutdownCoordinator;

/// Common error type for the relay
pub type Result<T> = anyhow::Result<T>;
