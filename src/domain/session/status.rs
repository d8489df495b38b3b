//! SessionStatus enum for tracking the lifecycle of intake sessions.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::StateMachine;

/// Lifecycle status of an intake session.
///
/// `Active` is the only non-terminal status; terminal statuses never revert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Active,
    /// Flow reached confirmed completion.
    Complete,
    /// Patient disconnected before confirmed completion.
    Abandoned,
    /// Unrecoverable failure terminated the session.
    Failed,
}

impl SessionStatus {
    /// Returns true if the session can still change.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Active)
    }
}

impl StateMachine for SessionStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use SessionStatus::*;
        matches!(
            (self, target),
            (Active, Complete) | (Active, Abandoned) | (Active, Failed)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SessionStatus::*;
        match self {
            Active => vec![Complete, Abandoned, Failed],
            Complete | Abandoned | Failed => vec![],
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Active => "active",
            SessionStatus::Complete => "complete",
            SessionStatus::Abandoned => "abandoned",
            SessionStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}
