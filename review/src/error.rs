use thiserror::Error;

use gauntlet_protocol::ReviewStatus;
use gauntlet_store::StoreError;

/// Failures of review-state transitions. The HTTP layer maps these
/// onto status codes: 404, 409 (with the observed state), 400, 403.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("Session not found")]
    NotFound,

    /// A compare-and-swap lost, or the task was not in a reviewable
    /// state. Carries the observed current state and the user-facing
    /// message.
    #[error("{message}")]
    Conflict {
        current: ReviewStatus,
        message: String,
    },

    /// A precondition (QC, acknowledgement, review count) was not met.
    #[error("{0}")]
    PreconditionFailed(String),

    /// The caller's role may not perform this action.
    #[error("{0}")]
    Forbidden(String),

    /// Malformed request input.
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReviewError {
    pub(crate) fn conflict(current: ReviewStatus, message: impl Into<String>) -> Self {
        ReviewError::Conflict {
            current,
            message: message.into(),
        }
    }
}
