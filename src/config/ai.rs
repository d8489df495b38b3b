//! Language model provider configuration (Gemini)

use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;

use super::error::ValidationError;

/// Gemini configuration for turn generation and schema extraction
#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    /// Gemini API key
    pub gemini_api_key: Secret<String>,

    /// Model used for conversational turn generation
    #[serde(default = "default_conversation_model")]
    pub conversation_model: String,

    /// Model used for structured extraction
    #[serde(default = "default_extraction_model")]
    pub extraction_model: String,

    /// Base URL for the Generative Language API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl AiConfig {
    /// Expose the API key for request signing
    pub fn api_key(&self) -> &str {
        self.gemini_api_key.expose_secret()
    }

    /// Validate AI configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.gemini_api_key.expose_secret().is_empty() {
            return Err(ValidationError::MissingRequired("ai.gemini_api_key"));
        }
        if self.timeout_secs == 0 || self.timeout_secs > 120 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}

fn default_conversation_model() -> String {
    "gemini-2.0-flash-lite".to_string()
}

fn default_extraction_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_timeout() -> u64 {
    30
}
