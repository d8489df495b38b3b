//! Conversation turns.

use serde::{Deserialize, Serialize};

use super::Stage;
use crate::domain::foundation::Timestamp;

/// Who produced an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Patient,
    Agent,
}

/// One utterance with its stage context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
    /// Stage the flow was in when this turn happened.
    pub stage: Stage,
    pub timestamp: Timestamp,
    /// Set when the flow force-advanced past an unanswered field.
    #[serde(default)]
    pub flagged: bool,
}

impl Turn {
    /// Creates a patient turn at the given stage.
    pub fn patient(text: impl Into<String>, stage: Stage) -> Self {
        Self {
            speaker: Speaker::Patient,
            text: text.into(),
            stage,
            timestamp: Timestamp::now(),
            flagged: false,
        }
    }

    /// Creates an agent turn at the given stage.
    pub fn agent(text: impl Into<String>, stage: Stage) -> Self {
        Self {
            speaker: Speaker::Agent,
            text: text.into(),
            stage,
            timestamp: Timestamp::now(),
            flagged: false,
        }
    }

    /// Marks the turn as a forced advancement.
    pub fn flagged(mut self) -> Self {
        self.flagged = true;
        self
    }
}
