//! gridalloc-core — types shared by every gridalloc crate.
//!
//! Holds the allocation plan (the only artifact distributed between
//! nodes), the solver result wire format, the local node's resource
//! record, and the daemon's TOML configuration.

pub mod config;
pub mod types;

pub use config::DaemonConfig;
pub use types::*;
