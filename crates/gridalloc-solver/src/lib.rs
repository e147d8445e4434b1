//! gridalloc-solver — one solve cycle, minus the publishing.
//!
//! ```text
//! probe      → NodeResources of the local node (startup, fatal on failure)
//! snapshot   → index-aligned node/function arrays from the registries
//! bridge     → SolveRequest → external Solve capability → SolverResult
//! planner    → SolverResult → AllocationPlan (+ per-function CPU demand)
//! ```
//!
//! The optimization model lives behind the [`Solve`] trait. The shipped
//! binding, [`ProcessSolver`], runs an external program that reads the
//! request as JSON on stdin and prints the result as JSON on stdout.

pub mod bridge;
pub mod error;
pub mod planner;
pub mod probe;
pub mod snapshot;

pub use bridge::{ProcessSolver, Solve, SolveRequest, solve_snapshot};
pub use error::*;
pub use planner::{AllocationPlanner, coerce_instances, cpu_demand};
pub use probe::{local_node, probe_local};
pub use snapshot::{FunctionArrays, NodeArrays, Snapshot, SnapshotBuilder};
