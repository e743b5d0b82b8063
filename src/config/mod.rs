//! Configuration Module
//!
//! Handles configuration loading, validation, and CLI overrides.

pub mod manager;
pub mod types;

pub use manager::{normalize_listen_addr, CliOverrides, ConfigManager};
pub use types::*;
