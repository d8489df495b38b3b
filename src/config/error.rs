//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Re-prompt budget must be at least 1")]
    InvalidRepromptBudget,

    #[error("Failure threshold must be at least 1")]
    InvalidFailureThreshold,

    #[error("Silence timeout must be at least 1 second")]
    InvalidSilenceTimeout,

    #[error("Session duration cap must exceed the silence timeout")]
    InvalidSessionDuration,

    #[error("Session max age must exceed the cleanup interval")]
    InvalidSessionMaxAge,
}
