//! gridalloc-scheduler — plan distribution and the role loops.
//!
//! One process runs exactly one role, fixed by configuration:
//!
//! ```text
//! Solver   every epoch: snapshot → solve → plan → publish → cache
//! Watcher  on every watch event: fetch → cache (whole-plan replace)
//! ```
//!
//! [`AllocationCache`] is the read side exposed to the rest of the
//! platform; only the role loop writes it.

pub mod cache;
pub mod error;
pub mod scheduler;
pub mod store;

pub use cache::AllocationCache;
pub use error::{SchedulerError, SchedulerResult, StoreError, StoreResult};
pub use scheduler::{CycleOutcome, Phase, Role, Scheduler};
pub use store::{ALLOCATION_KEY, AllocationStore};
