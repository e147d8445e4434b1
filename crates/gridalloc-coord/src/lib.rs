//! gridalloc-coord — the coordination store seam.
//!
//! Plans travel between nodes through a key-value service offering
//! TTL-bound leases, point reads, and key watches. The [`Coordinator`]
//! trait is that contract; [`MemoryCoordinator`] implements it in
//! process with real lease expiry and watch fan-out, which is what the
//! standalone daemon and the tests run against.
//!
//! # Semantics
//!
//! ```text
//! grant(ttl)           → lease id; when ttl elapses every key bound to
//!                        the lease is deleted and watchers see Delete
//! put(key, v, lease)   → overwrite, bump revision, watchers see Put
//! get(key)             → current value or None
//! watch(key)           → unbounded stream of Put/Delete events for key
//! ```

pub mod coordinator;
pub mod error;
pub mod memory;

pub use coordinator::{Coordinator, KeyValue, LeaseId, Revision, WatchEvent, WatchStream};
pub use error::{CoordError, CoordResult};
pub use memory::{CoordFaults, MemoryCoordinator};
