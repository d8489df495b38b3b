//! Speech ports - transcription, synthesis, and voice activity detection.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;

use super::{AudioFrame, AudioStream};

/// One transcription result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEvent {
    pub text: String,
    /// Final results drive the intake flow; interim ones are informational.
    pub is_final: bool,
}

impl TranscriptEvent {
    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }

    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }
}

/// Stream of transcript events.
pub type TranscriptStream = Pin<Box<dyn Stream<Item = Result<TranscriptEvent, SpeechError>> + Send>>;

/// Port for speech-to-text engines.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Consumes an audio stream, emitting transcript events as speech is
    /// recognized.
    async fn transcribe(&self, audio: AudioStream) -> Result<TranscriptStream, SpeechError>;
}

/// Port for text-to-speech engines.
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Synthesizes the text into an audio stream.
    async fn synthesize(&self, text: &str) -> Result<AudioStream, SpeechError>;
}

/// Speech boundary events used for STT framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadEvent {
    SpeechStart,
    SpeechEnd,
}

/// Port for voice activity detection.
///
/// Stateful: implementations track hangover frames internally.
pub trait VoiceActivityDetector: Send {
    /// Feeds one frame; returns a boundary event when one occurs.
    fn process(&mut self, frame: &AudioFrame) -> Option<VadEvent>;

    /// Resets detector state between utterances.
    fn reset(&mut self);
}

/// Recognition and synthesis failures.
///
/// Recoverable up to the lifecycle's retry threshold, then fatal.
#[derive(Debug, Clone, Error)]
pub enum SpeechError {
    #[error("speech api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u32 },

    #[error("failed to decode audio: {0}")]
    Decode(String),
}

impl SpeechError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        SpeechError::Api {
            status,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        SpeechError::Network(message.into())
    }

    /// Returns true if retrying the call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SpeechError::Network(_) | SpeechError::Timeout { .. } => true,
            SpeechError::Api { status, .. } => *status >= 500,
            SpeechError::Decode(_) => false,
        }
    }
}
