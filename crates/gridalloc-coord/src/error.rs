//! Coordination store error types.

use thiserror::Error;

use crate::coordinator::LeaseId;

/// Result type alias for coordination store operations.
pub type CoordResult<T> = Result<T, CoordError>;

/// Errors returned by a coordination store.
#[derive(Debug, Error)]
pub enum CoordError {
    #[error("coordination store unavailable: {0}")]
    Unavailable(String),

    #[error("lease not found: {0}")]
    LeaseNotFound(LeaseId),
}
