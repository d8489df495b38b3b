//! Intake flow stages.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::StateMachine;

/// One ordered phase of the intake flow.
///
/// Stages carry a fixed total order. Transitions are forward-only, with two
/// exceptions: a single explicit go-back signal moves exactly one stage
/// backward, and forced termination jumps directly to `Complete`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    #[default]
    Greeting,
    Demographics,
    VisitReason,
    MedicalHistory,
    Medications,
    Allergies,
    Confirmation,
    Complete,
}

impl Stage {
    /// All stages in flow order.
    pub const ORDER: [Stage; 8] = [
        Stage::Greeting,
        Stage::Demographics,
        Stage::VisitReason,
        Stage::MedicalHistory,
        Stage::Medications,
        Stage::Allergies,
        Stage::Confirmation,
        Stage::Complete,
    ];

    /// Returns the next stage in flow order, or None from `Complete`.
    pub fn next(&self) -> Option<Stage> {
        let idx = Stage::ORDER.iter().position(|s| s == self)?;
        Stage::ORDER.get(idx + 1).copied()
    }

    /// Returns the previous stage in flow order, or None from `Greeting`.
    pub fn prev(&self) -> Option<Stage> {
        let idx = Stage::ORDER.iter().position(|s| s == self)?;
        idx.checked_sub(1).and_then(|i| Stage::ORDER.get(i)).copied()
    }

    /// Returns true once the flow has finished.
    pub fn is_complete(&self) -> bool {
        matches!(self, Stage::Complete)
    }
}

impl StateMachine for Stage {
    fn can_transition_to(&self, target: &Self) -> bool {
        if self.is_complete() {
            return false;
        }
        // Forward by one, backward by one (go-back), or forced jump to Complete.
        self.next() == Some(*target)
            || self.prev() == Some(*target)
            || *target == Stage::Complete
    }

    fn valid_transitions(&self) -> Vec<Self> {
        if self.is_complete() {
            return vec![];
        }
        let mut targets = Vec::new();
        if let Some(prev) = self.prev() {
            targets.push(prev);
        }
        if let Some(next) = self.next() {
            targets.push(next);
        }
        if !targets.contains(&Stage::Complete) {
            targets.push(Stage::Complete);
        }
        targets
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Greeting => "GREETING",
            Stage::Demographics => "DEMOGRAPHICS",
            Stage::VisitReason => "VISIT_REASON",
            Stage::MedicalHistory => "MEDICAL_HISTORY",
            Stage::Medications => "MEDICATIONS",
            Stage::Allergies => "ALLERGIES",
            Stage::Confirmation => "CONFIRMATION",
            Stage::Complete => "COMPLETE",
        };
        write!(f, "{}", s)
    }
}
