//! Scheduler error types.

use thiserror::Error;

use gridalloc_coord::CoordError;
use gridalloc_solver::{PlanError, SnapshotError, SolveError};

pub type StoreResult<T> = Result<T, StoreError>;
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Publishing or fetching the plan failed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no allocation published under key {0}")]
    NotFound(String),

    #[error("coordination store unavailable: {0}")]
    Unavailable(String),

    #[error("stored allocation is corrupt: {0}")]
    Corrupt(String),

    #[error("lease grant failed: {0}")]
    Lease(#[source] CoordError),

    #[error("failed to serialize allocation: {0}")]
    Serialize(String),
}

/// A solve cycle failed. Any of these ends the solver loop.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("snapshot failed: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("solve failed: {0}")]
    Solve(#[from] SolveError),

    #[error("planning failed: {0}")]
    Plan(#[from] PlanError),

    #[error("publish failed: {0}")]
    Store(#[from] StoreError),
}
