//! Voice pipeline configuration (Deepgram STT/TTS, Daily transport)

use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;

use super::error::ValidationError;

/// Configuration for the speech and transport collaborators
#[derive(Debug, Clone, Deserialize)]
pub struct VoiceConfig {
    /// Deepgram API key (STT and TTS)
    pub deepgram_api_key: Secret<String>,

    /// Daily API key (room provisioning); empty disables voice mode
    #[serde(default)]
    pub daily_api_key: Option<Secret<String>>,

    /// Deepgram STT model
    #[serde(default = "default_stt_model")]
    pub stt_model: String,

    /// Deepgram TTS voice
    #[serde(default = "default_tts_voice")]
    pub tts_voice: String,

    /// Deepgram REST base URL
    #[serde(default = "default_deepgram_base_url")]
    pub deepgram_base_url: String,

    /// Daily REST base URL
    #[serde(default = "default_daily_base_url")]
    pub daily_base_url: String,

    /// WebSocket URL of the media gateway bridging room audio to the bot
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    /// Room expiry in seconds
    #[serde(default = "default_room_expiry")]
    pub room_expiry_secs: u64,
}

impl VoiceConfig {
    /// Expose the Deepgram key for request signing
    pub fn deepgram_key(&self) -> &str {
        self.deepgram_api_key.expose_secret()
    }

    /// Expose the Daily key, if configured
    pub fn daily_key(&self) -> Option<&str> {
        self.daily_api_key.as_ref().map(|k| k.expose_secret().as_str())
    }

    /// Validate voice configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.deepgram_api_key.expose_secret().is_empty() {
            return Err(ValidationError::MissingRequired("voice.deepgram_api_key"));
        }
        Ok(())
    }
}

fn default_stt_model() -> String {
    "nova-2".to_string()
}

fn default_tts_voice() -> String {
    "aura-asteria-en".to_string()
}

fn default_deepgram_base_url() -> String {
    "https://api.deepgram.com".to_string()
}

fn default_daily_base_url() -> String {
    "https://api.daily.co/v1".to_string()
}

fn default_gateway_url() -> String {
    "ws://127.0.0.1:8765/media".to_string()
}

fn default_room_expiry() -> u64 {
    3600
}
