//! Connection Management Module
//!
//! Handles listening, dialing, and the per-peer relay lifecycle.

pub mod manager;
pub mod transport;

pub use manager::ConnectionManager;
pub use transport::Connection;
