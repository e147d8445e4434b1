//! gridalloc-state — node and function registries.
//!
//! Backed by [redb](https://docs.rs/redb). The node registry holds the
//! status each peer last reported (resources plus advertised URL); the
//! function registry holds per-function metadata, including the CPU
//! demand the planner derives after every solve.
//!
//! Values are JSON-serialized into redb's `&[u8]` value columns. The
//! `RegistryStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`).

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::RegistryStore;
pub use types::*;
