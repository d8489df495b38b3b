//! Daily room provisioning and the media gateway transport.
//!
//! Rooms and meeting tokens come from the Daily REST API. Live media does
//! not: the bot exchanges audio with the room through a gateway process
//! that sits on the WebRTC side and re-exposes the call as a plain
//! WebSocket. Binary frames carry 16 kHz mono PCM (little-endian i16) in
//! both directions; text frames carry JSON signaling events.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::config::VoiceConfig;
use crate::ports::{
    AudioFrame, AudioStream, RoomInfo, RoomService, Transport, TransportConnection,
    TransportError, TransportEvent,
};

/// Sample rate of gateway audio, both directions.
pub const GATEWAY_SAMPLE_RATE: u32 = 16_000;

/// Provisions Daily rooms and meeting tokens over REST.
pub struct DailyRoomService {
    client: Client,
    api_key: String,
    base_url: String,
    room_expiry: Duration,
}

impl DailyRoomService {
    pub fn new(config: &VoiceConfig) -> Result<Self, TransportError> {
        let api_key = config
            .daily_key()
            .ok_or_else(|| {
                TransportError::NotConfigured("daily_api_key is not set".to_string())
            })?
            .to_string();
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TransportError::room_provisioning(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            base_url: config.daily_base_url.clone(),
            room_expiry: Duration::from_secs(config.room_expiry_secs),
        })
    }

    async fn create_daily_room(&self) -> Result<DailyRoom, TransportError> {
        let expiry = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            + self.room_expiry.as_secs();
        let body = CreateRoomRequest {
            properties: RoomProperties {
                exp: expiry,
                enable_prejoin_ui: false,
                start_audio_off: false,
                start_video_off: true,
            },
        };
        let response = self
            .client
            .post(format!("{}/rooms", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::room_provisioning(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(TransportError::api(status.as_u16(), text));
        }
        response
            .json()
            .await
            .map_err(|e| TransportError::room_provisioning(format!("malformed response: {e}")))
    }

    async fn create_meeting_token(&self, room_name: &str) -> Result<String, TransportError> {
        let body = CreateTokenRequest {
            properties: TokenProperties {
                room_name: room_name.to_string(),
                is_owner: false,
            },
        };
        let response = self
            .client
            .post(format!("{}/meeting-tokens", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::room_provisioning(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(TransportError::api(status.as_u16(), text));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| TransportError::room_provisioning(format!("malformed response: {e}")))?;
        Ok(token.token)
    }
}

#[async_trait]
impl RoomService for DailyRoomService {
    async fn create_room(&self) -> Result<RoomInfo, TransportError> {
        let room = self.create_daily_room().await?;
        let token = self.create_meeting_token(&room.name).await?;
        debug!(room = %room.name, "room provisioned");
        Ok(RoomInfo::new(room.url).with_token(token))
    }
}

/// Transport that joins the room through the media gateway.
pub struct GatewayTransport {
    gateway_url: String,
}

impl GatewayTransport {
    pub fn new(config: &VoiceConfig) -> Self {
        Self {
            gateway_url: config.gateway_url.clone(),
        }
    }
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[async_trait]
impl Transport for GatewayTransport {
    async fn join(&self, room: &RoomInfo) -> Result<Box<dyn TransportConnection>, TransportError> {
        let (socket, _) = connect_async(&self.gateway_url)
            .await
            .map_err(|e| TransportError::join_failed(format!("gateway connect: {e}")))?;
        let (mut sink, stream) = socket.split();

        let hello = serde_json::to_string(&GatewayHello {
            room_url: room.url.clone(),
            token: room.token.clone(),
        })
        .map_err(|e| TransportError::join_failed(format!("hello encode: {e}")))?;
        sink.send(Message::Text(hello))
            .await
            .map_err(|e| TransportError::join_failed(format!("hello send: {e}")))?;

        // One socket reader demultiplexes signaling and audio.
        let (event_tx, event_rx) = tokio::sync::mpsc::channel(16);
        let (audio_tx, audio_rx) = futures::channel::mpsc::channel(64);
        let reader = tokio::spawn(read_socket(stream, event_tx, audio_tx));

        debug!(room = %room.url, "joined room via gateway");
        Ok(Box::new(GatewayConnection {
            sink,
            events: event_rx,
            audio: Some(Box::pin(audio_rx)),
            reader,
            closed: false,
        }))
    }
}

/// Demux loop: text frames become transport events, binary frames become
/// audio. Frames are dropped rather than buffered when the consumer lags.
async fn read_socket(
    mut stream: SplitStream<Socket>,
    events: tokio::sync::mpsc::Sender<TransportEvent>,
    mut audio: futures::channel::mpsc::Sender<AudioFrame>,
) {
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<GatewayEvent>(&text) {
                Ok(event) => {
                    if events.send(event.into()).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "unparseable gateway event");
                }
            },
            Ok(Message::Binary(bytes)) => {
                let frame = AudioFrame::new(decode_pcm(&bytes), GATEWAY_SAMPLE_RATE);
                if audio.try_send(frame).is_err() {
                    debug!("audio consumer lagging, frame dropped");
                }
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
            Ok(Message::Close(_)) => break,
            Err(err) => {
                let _ = events
                    .send(TransportEvent::Error {
                        message: err.to_string(),
                    })
                    .await;
                break;
            }
        }
    }
    // Dropped senders close both downstream channels.
}

/// One live gateway session.
struct GatewayConnection {
    sink: SplitSink<Socket, Message>,
    events: tokio::sync::mpsc::Receiver<TransportEvent>,
    audio: Option<AudioStream>,
    reader: tokio::task::JoinHandle<()>,
    closed: bool,
}

#[async_trait]
impl TransportConnection for GatewayConnection {
    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    fn take_audio_input(&mut self) -> Option<AudioStream> {
        self.audio.take()
    }

    async fn send_audio(&mut self, frame: AudioFrame) -> Result<(), TransportError> {
        self.sink
            .send(Message::Binary(encode_pcm(&frame.samples)))
            .await
            .map_err(|e| TransportError::connection_lost(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let result = self.sink.send(Message::Close(None)).await;
        self.reader.abort();
        result.map_err(|e| TransportError::connection_lost(e.to_string()))
    }
}

/// Encodes samples as little-endian bytes.
fn encode_pcm(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Decodes little-endian bytes into samples, ignoring a trailing odd byte.
fn decode_pcm(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

// --- Wire format ---

#[derive(Debug, Serialize)]
struct GatewayHello {
    room_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum GatewayEvent {
    ParticipantJoined { participant_id: String },
    ParticipantLeft { reason: String },
    Error { message: String },
}

impl From<GatewayEvent> for TransportEvent {
    fn from(event: GatewayEvent) -> Self {
        match event {
            GatewayEvent::ParticipantJoined { participant_id } => {
                TransportEvent::ParticipantJoined { participant_id }
            }
            GatewayEvent::ParticipantLeft { reason } => TransportEvent::ParticipantLeft { reason },
            GatewayEvent::Error { message } => TransportEvent::Error { message },
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateRoomRequest {
    properties: RoomProperties,
}

#[derive(Debug, Serialize)]
struct RoomProperties {
    exp: u64,
    enable_prejoin_ui: bool,
    start_audio_off: bool,
    start_video_off: bool,
}

#[derive(Debug, Deserialize)]
struct DailyRoom {
    name: String,
    url: String,
}

#[derive(Debug, Serialize)]
struct CreateTokenRequest {
    properties: TokenProperties,
}

#[derive(Debug, Serialize)]
struct TokenProperties {
    room_name: String,
    is_owner: bool,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}
