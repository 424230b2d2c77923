//! Shared error types for the services crate.

use thiserror::Error;

use backend::ProviderError;
use quiz_core::model::{AccessError, SessionStateError};

use crate::sessions::SessionPhase;

/// Errors emitted by `QuizSessionController`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionError {
    #[error(transparent)]
    QuotaExceeded(#[from] AccessError),
    #[error("failed to load quiz: {0}")]
    Fetch(ProviderError),
    #[error("failed to create attempt: {0}")]
    Creation(ProviderError),
    #[error("failed to save progress: {0}")]
    Save(ProviderError),
    #[error("failed to submit attempt: {0}")]
    Submit(ProviderError),
    #[error(transparent)]
    State(#[from] SessionStateError),
    #[error("cannot {action} while the session is {phase}")]
    InvalidPhase {
        action: &'static str,
        phase: SessionPhase,
    },
    #[error("another save or submission is in flight")]
    Busy,
    #[error("the session was discarded before the operation finished")]
    Discarded,
}

impl SessionError {
    /// Whether the caller may simply retry the same operation.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SessionError::Fetch(_)
                | SessionError::Creation(_)
                | SessionError::Save(_)
                | SessionError::Submit(_)
                | SessionError::Busy
        )
    }
}

/// Errors emitted by `ResultsService`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResultsError {
    #[error("failed to load attempt: {0}")]
    Attempt(ProviderError),
    #[error("failed to load quiz for attempt: {0}")]
    Quiz(ProviderError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_refusal_is_not_retryable() {
        let err = SessionError::from(AccessError::QuotaExceeded { used: 3, limit: 3 });
        assert!(!err.is_retryable());
        assert!(SessionError::Save(ProviderError::NotFound).is_retryable());
    }

    #[test]
    fn phase_errors_name_the_action() {
        let err = SessionError::InvalidPhase {
            action: "navigate",
            phase: SessionPhase::Completed,
        };
        assert_eq!(
            err.to_string(),
            "cannot navigate while the session is completed"
        );
    }
}
