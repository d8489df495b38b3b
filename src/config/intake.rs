//! Intake flow and session lifecycle policy configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Policy constants for the intake flow and session lifecycle
#[derive(Debug, Clone, Deserialize)]
pub struct IntakeConfig {
    /// Unproductive re-prompts per field before force-advancing
    #[serde(default = "default_max_reprompts")]
    pub max_reprompts: u32,

    /// Consecutive recognition/generation failures before the session fails
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// Silence window before a re-prompt, in seconds
    #[serde(default = "default_silence_timeout")]
    pub silence_timeout_secs: u64,

    /// Hard cap on one session's run, in seconds
    #[serde(default = "default_max_session")]
    pub max_session_secs: u64,

    /// Backoff before the single retry of a failed collaborator call, in
    /// milliseconds
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Age past which terminal sessions are swept, in seconds
    #[serde(default = "default_session_max_age")]
    pub session_max_age_secs: u64,

    /// Interval between cleanup sweeps, in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

impl IntakeConfig {
    /// Validate intake configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_reprompts == 0 {
            return Err(ValidationError::InvalidRepromptBudget);
        }
        if self.max_consecutive_failures == 0 {
            return Err(ValidationError::InvalidFailureThreshold);
        }
        if self.silence_timeout_secs == 0 {
            return Err(ValidationError::InvalidSilenceTimeout);
        }
        if self.max_session_secs <= self.silence_timeout_secs {
            return Err(ValidationError::InvalidSessionDuration);
        }
        if self.session_max_age_secs <= self.cleanup_interval_secs {
            return Err(ValidationError::InvalidSessionMaxAge);
        }
        Ok(())
    }
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            max_reprompts: default_max_reprompts(),
            max_consecutive_failures: default_max_consecutive_failures(),
            silence_timeout_secs: default_silence_timeout(),
            max_session_secs: default_max_session(),
            retry_backoff_ms: default_retry_backoff(),
            session_max_age_secs: default_session_max_age(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

fn default_max_reprompts() -> u32 {
    2
}

fn default_max_consecutive_failures() -> u32 {
    3
}

fn default_silence_timeout() -> u64 {
    20
}

fn default_max_session() -> u64 {
    600
}

fn default_retry_backoff() -> u64 {
    500
}

fn default_session_max_age() -> u64 {
    3600
}

fn default_cleanup_interval() -> u64 {
    300
}
