//! Mock transport for testing: scripted events, captured outbound audio.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::ports::{
    AudioFrame, AudioStream, RoomInfo, RoomService, Transport, TransportConnection,
    TransportError, TransportEvent,
};

/// Room service returning a canned room.
#[derive(Debug, Clone)]
pub struct MockRoomService {
    room: RoomInfo,
    fail: bool,
}

impl MockRoomService {
    pub fn new() -> Self {
        Self {
            room: RoomInfo::new("https://rooms.test/mock").with_token("mock-token"),
            fail: false,
        }
    }

    /// Makes provisioning fail.
    pub fn failing() -> Self {
        Self {
            room: RoomInfo::new(""),
            fail: true,
        }
    }
}

impl Default for MockRoomService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoomService for MockRoomService {
    async fn create_room(&self) -> Result<RoomInfo, TransportError> {
        if self.fail {
            return Err(TransportError::room_provisioning("mock outage"));
        }
        Ok(self.room.clone())
    }
}

/// Transport whose connections replay scripted events and audio.
#[derive(Clone, Default)]
pub struct MockTransport {
    events: Arc<Mutex<VecDeque<TransportEvent>>>,
    audio: Arc<Mutex<Vec<AudioFrame>>>,
    sent: Arc<Mutex<Vec<AudioFrame>>>,
    fail_join: Arc<Mutex<bool>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an event the connection will emit.
    pub fn with_event(self, event: TransportEvent) -> Self {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(event);
        self
    }

    /// Queues an inbound audio frame.
    pub fn with_audio(self, frame: AudioFrame) -> Self {
        self.audio
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(frame);
        self
    }

    /// Makes join fail.
    pub fn with_join_failure(self) -> Self {
        *self.fail_join.lock().unwrap_or_else(|e| e.into_inner()) = true;
        self
    }

    /// Audio frames the bot has sent so far.
    pub fn sent_audio(&self) -> Vec<AudioFrame> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn join(&self, _room: &RoomInfo) -> Result<Box<dyn TransportConnection>, TransportError> {
        if *self.fail_join.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(TransportError::join_failed("mock join refused"));
        }
        let frames: Vec<AudioFrame> = self
            .audio
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        Ok(Box::new(MockConnection {
            events: Arc::clone(&self.events),
            audio: Some(Box::pin(futures::stream::iter(frames))),
            sent: Arc::clone(&self.sent),
            closed: false,
        }))
    }
}

struct MockConnection {
    events: Arc<Mutex<VecDeque<TransportEvent>>>,
    audio: Option<AudioStream>,
    sent: Arc<Mutex<Vec<AudioFrame>>>,
    closed: bool,
}

#[async_trait]
impl TransportConnection for MockConnection {
    async fn next_event(&mut self) -> Option<TransportEvent> {
        let next = self
            .events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        if next.is_none() {
            // Scripted events exhausted; behave like a quiet open connection
            // instead of reporting closure over and over.
            futures::future::pending::<()>().await;
        }
        next
    }

    fn take_audio_input(&mut self) -> Option<AudioStream> {
        self.audio.take()
    }

    async fn send_audio(&mut self, frame: AudioFrame) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::connection_lost("mock connection closed"));
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(frame);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn connection_replays_scripted_events() {
        let transport = MockTransport::new()
            .with_event(TransportEvent::ParticipantJoined {
                participant_id: "p1".to_string(),
            })
            .with_event(TransportEvent::ParticipantLeft {
                reason: "hangup".to_string(),
            });
        let mut conn = transport.join(&RoomInfo::new("room")).await.unwrap();

        assert!(matches!(
            conn.next_event().await,
            Some(TransportEvent::ParticipantJoined { .. })
        ));
        assert!(matches!(
            conn.next_event().await,
            Some(TransportEvent::ParticipantLeft { .. })
        ));
    }

    #[tokio::test]
    async fn audio_input_is_takeable_once() {
        let transport =
            MockTransport::new().with_audio(AudioFrame::new(vec![1, 2, 3], 16_000));
        let mut conn = transport.join(&RoomInfo::new("room")).await.unwrap();

        let stream = conn.take_audio_input().unwrap();
        assert!(conn.take_audio_input().is_none());

        let frames: Vec<AudioFrame> = stream.collect().await;
        assert_eq!(frames.len(), 1);
    }

    #[tokio::test]
    async fn sent_audio_is_captured() {
        let transport = MockTransport::new();
        let mut conn = transport.join(&RoomInfo::new("room")).await.unwrap();
        conn.send_audio(AudioFrame::new(vec![5; 160], 16_000))
            .await
            .unwrap();
        assert_eq!(transport.sent_audio().len(), 1);
    }

    #[tokio::test]
    async fn join_failure_is_injectable() {
        let transport = MockTransport::new().with_join_failure();
        assert!(transport.join(&RoomInfo::new("room")).await.is_err());
    }

    // The session task owns the boxed connection, so the trait object must
    // move into a spawned task even though the audio stream is not Sync.
    #[tokio::test]
    async fn boxed_connection_moves_into_a_task() {
        let transport = MockTransport::new().with_event(TransportEvent::ParticipantJoined {
            participant_id: "p1".to_string(),
        });
        let mut conn: Box<dyn TransportConnection> =
            transport.join(&RoomInfo::new("room")).await.unwrap();

        let event = tokio::spawn(async move { conn.next_event().await })
            .await
            .unwrap();
        assert!(matches!(
            event,
            Some(TransportEvent::ParticipantJoined { .. })
        ));
    }
}
