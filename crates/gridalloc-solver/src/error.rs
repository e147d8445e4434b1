//! Error types for the solve pipeline.

use std::time::Duration;

use thiserror::Error;

use gridalloc_state::StateError;

pub type ProbeResult<T> = Result<T, ProbeError>;
pub type SnapshotResult<T> = Result<T, SnapshotError>;
pub type SolveResult<T> = Result<T, SolveError>;
pub type PlanResult<T> = Result<T, PlanError>;

/// Reading local capability failed. Fatal at startup.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: &'static str,
        source: std::io::Error,
    },

    #[error("missing field in {path}: {field}")]
    MissingField {
        path: &'static str,
        field: &'static str,
    },

    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },

    #[error("cannot determine local ip: {0}")]
    LocalIp(String),

    #[error("resource probing is not supported on this platform")]
    Unsupported,
}

/// Assembling the snapshot failed as a whole.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("registry error: {0}")]
    Registry(#[from] StateError),
}

/// The external solve call failed or answered with something unusable.
#[derive(Debug, Error)]
pub enum SolveError {
    #[error("invalid solve request: {0}")]
    InvalidRequest(String),

    #[error("solver command is empty")]
    EmptyCommand,

    #[error("solver i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("solver did not answer within {0:?}")]
    Timeout(Duration),

    #[error("solver exited with code {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    #[error("malformed solver response: {0}")]
    Malformed(String),
}

/// Turning a solver result into a plan failed.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("function not found: {0}")]
    FunctionNotFound(String),

    #[error("no capacity reported for function index {0}")]
    MissingCapacity(usize),

    #[error("local maximum capacity must be positive, got {0}")]
    InvalidLocalCapacity(f64),

    #[error("function registry error: {0}")]
    Registry(#[from] StateError),
}
