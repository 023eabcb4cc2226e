//! Error taxonomy for workflow transitions.

use countersign_store::StoreError;
use countersign_types::{PayloadError, ReviewStatus};
use thiserror::Error;

/// Errors surfaced to workflow callers.
///
/// Sequence conflicts never appear here: they are retried internally with a
/// freshly derived sequence and only escalate as `Unavailable` once the
/// bounded retry attempts run out.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("not found: {0}")]
    NotFound(String),

    /// The transition's precondition did not hold. Carries the artifact's
    /// actual status so callers can decide how to proceed.
    #[error("invalid state ({current}): {detail}")]
    InvalidState {
        current: ReviewStatus,
        detail: String,
    },

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("version history integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("sequence allocation still contended after {attempts} attempts")]
    Unavailable { attempts: u32 },

    #[error("storage error: {0}")]
    Storage(StoreError),
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::NotFound(what),
            other => Self::Storage(other),
        }
    }
}

impl From<PayloadError> for WorkflowError {
    fn from(err: PayloadError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Result type alias for workflow operations.
pub type WorkflowResult<T> = Result<T, WorkflowError>;
