//! Transport port - real-time room signaling and audio.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use thiserror::Error;

/// One frame of raw audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// 16-bit PCM samples, mono.
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Root-mean-square energy of the frame.
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = self
            .samples
            .iter()
            .map(|s| {
                let v = *s as f64;
                v * v
            })
            .sum();
        (sum / self.samples.len() as f64).sqrt() as f32
    }
}

/// Stream of audio frames.
pub type AudioStream = Pin<Box<dyn Stream<Item = AudioFrame> + Send>>;

/// Connection credentials for one session's room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInfo {
    pub url: String,
    pub token: Option<String>,
}

impl RoomInfo {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Port for provisioning rooms (session-scoped credentials).
#[async_trait]
pub trait RoomService: Send + Sync {
    /// Creates a new room for a session.
    async fn create_room(&self) -> Result<RoomInfo, TransportError>;
}

/// Events emitted by a live transport connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    ParticipantJoined { participant_id: String },
    ParticipantLeft { reason: String },
    Error { message: String },
}

/// Port for joining a room.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Joins the room, returning a live connection.
    async fn join(&self, room: &RoomInfo) -> Result<Box<dyn TransportConnection>, TransportError>;
}

/// A live room connection.
///
/// Owned by the session task and driven through `&mut self`, so `Send`
/// is required but `Sync` is not (the inner audio stream is not `Sync`).
///
/// Transport failures are fatal by policy: the lifecycle never retries
/// them, it terminates the session.
#[async_trait]
pub trait TransportConnection: Send {
    /// Waits for the next signaling event. `None` once the connection is
    /// closed.
    async fn next_event(&mut self) -> Option<TransportEvent>;

    /// Takes the inbound (patient) audio stream. Callable once.
    fn take_audio_input(&mut self) -> Option<AudioStream>;

    /// Sends synthesized agent audio into the room.
    async fn send_audio(&mut self, frame: AudioFrame) -> Result<(), TransportError>;

    /// Closes the connection. Idempotent.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Transport-level failures.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("room provisioning failed: {message}")]
    RoomProvisioning { message: String },

    #[error("failed to join room: {message}")]
    JoinFailed { message: String },

    #[error("connection lost: {message}")]
    ConnectionLost { message: String },

    #[error("transport api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("transport not configured: {0}")]
    NotConfigured(String),
}

impl TransportError {
    pub fn room_provisioning(message: impl Into<String>) -> Self {
        TransportError::RoomProvisioning {
            message: message.into(),
        }
    }

    pub fn join_failed(message: impl Into<String>) -> Self {
        TransportError::JoinFailed {
            message: message.into(),
        }
    }

    pub fn connection_lost(message: impl Into<String>) -> Self {
        TransportError::ConnectionLost {
            message: message.into(),
        }
    }

    pub fn api(status: u16, message: impl Into<String>) -> Self {
        TransportError::Api {
            status,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_of_silence_is_zero() {
        let frame = AudioFrame::new(vec![0; 160], 16000);
        assert_eq!(frame.rms(), 0.0);
    }

    #[test]
    fn rms_grows_with_amplitude() {
        let quiet = AudioFrame::new(vec![10; 160], 16000);
        let loud = AudioFrame::new(vec![10_000; 160], 16000);
        assert!(loud.rms() > quiet.rms());
    }

    #[test]
    fn room_info_builder() {
        let room = RoomInfo::new("https://rooms.example/abc").with_token("tok");
        assert_eq!(room.url, "https://rooms.example/abc");
        assert_eq!(room.token.as_deref(), Some("tok"));
    }
}
