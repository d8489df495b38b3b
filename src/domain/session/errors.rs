//! Session domain errors.

use thiserror::Error;

use super::SessionStatus;
use crate::domain::foundation::{SessionId, ValidationError};

/// Errors raised by the session aggregate and registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Session {id} not found")]
    NotFound { id: SessionId },

    #[error("Session is already {status}")]
    AlreadyTerminal { status: SessionStatus },

    #[error("Invalid stage transition: {reason}")]
    InvalidStageTransition { reason: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl SessionError {
    /// Creates a not-found error.
    pub fn not_found(id: SessionId) -> Self {
        SessionError::NotFound { id }
    }

    /// Creates an already-terminal error.
    pub fn already_terminal(status: SessionStatus) -> Self {
        SessionError::AlreadyTerminal { status }
    }

    /// Creates an invalid stage transition error.
    pub fn invalid_stage_transition(reason: impl Into<String>) -> Self {
        SessionError::InvalidStageTransition {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_displays_the_id() {
        let id = SessionId::new();
        let err = SessionError::not_found(id);
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn validation_errors_convert() {
        let err: SessionError = ValidationError::empty_field("text").into();
        assert!(matches!(err, SessionError::Validation(_)));
    }
}
