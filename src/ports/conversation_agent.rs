//! Conversation agent port - turn generation capability of the language
//! collaborator.
//!
//! Kept separate from [`crate::ports::IntakeExtractor`] so either capability
//! can be swapped or stubbed independently in tests.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::intake::{IntakeRecord, Stage, Turn};

/// Port for generating the agent's next conversational turn.
#[async_trait]
pub trait ConversationAgent: Send + Sync {
    /// Produces the next thing the agent should say.
    ///
    /// Implementations rephrase the scripted prompt in context; the caller
    /// falls back to the scripted prompt itself when this fails.
    async fn next_prompt(&self, context: &PromptContext) -> Result<String, AiError>;
}

/// Everything a turn generator needs to phrase the next prompt.
#[derive(Debug, Clone)]
pub struct PromptContext {
    /// Stage the flow is in after the latest step.
    pub stage: Stage,
    /// Deterministic prompt the state machine selected.
    pub scripted_prompt: String,
    /// Data collected so far.
    pub collected: IntakeRecord,
    /// Recent turns, oldest first (bounded window).
    pub recent_turns: Vec<Turn>,
    /// The patient utterance that triggered this step.
    pub latest_utterance: String,
}

/// Errors from the language collaborator.
#[derive(Debug, Clone, Error)]
pub enum AiError {
    /// Request timed out.
    #[error("request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u32 },

    /// Network error during request.
    #[error("network error: {0}")]
    Network(String),

    /// Failed to parse the model's response.
    #[error("parse error: {0}")]
    Parse(String),

    /// Provider is unavailable.
    #[error("provider unavailable: {message}")]
    Unavailable { message: String },

    /// API key or authentication failed.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Invalid request configuration.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl AiError {
    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        AiError::Network(message.into())
    }

    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        AiError::Parse(message.into())
    }

    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        AiError::Unavailable {
            message: message.into(),
        }
    }

    /// Returns true if retrying the call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AiError::Timeout { .. } | AiError::Network(_) | AiError::Unavailable { .. }
        )
    }
}
