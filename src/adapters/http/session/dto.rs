//! HTTP DTOs for intake session endpoints.
//!
//! These types decouple the HTTP API from domain types, allowing independent evolution.

use serde::{Deserialize, Serialize};

use crate::application::ChatReply;
use crate::domain::intake::{IntakeRecord, Speaker, Stage, Turn};
use crate::domain::session::{Session, SessionStatus};
use crate::ports::RoomInfo;

// ════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════

/// Request body for one text-chat turn.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

// ════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════

/// Response for session creation: the id plus everything the client needs
/// to join the room.
#[derive(Debug, Clone, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub room_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Full session snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub id: String,
    pub status: SessionStatus,
    pub stage: Stage,
    pub data: IntakeRecord,
    pub history: Vec<TurnResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

/// One conversation turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnResponse {
    pub speaker: Speaker,
    pub text: String,
    pub stage: Stage,
    pub timestamp: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub flagged: bool,
}

/// Room connection info for an existing session.
#[derive(Debug, Clone, Serialize)]
pub struct RoomResponse {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Agent reply to one text-chat turn.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub reply: String,
    pub stage: Stage,
    pub is_complete: bool,
}

/// Opening line for a text-chat session.
#[derive(Debug, Clone, Serialize)]
pub struct GreetingResponse {
    pub message: String,
    pub stage: Stage,
}

/// Standard error payload.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("bad_request", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new("service_unavailable", message)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Conversions
// ════════════════════════════════════════════════════════════════════════════

impl From<&Session> for SessionResponse {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id().to_string(),
            status: session.status(),
            stage: session.stage(),
            data: session.data().clone(),
            history: session.history().iter().map(TurnResponse::from).collect(),
            error: session.error().map(str::to_string),
            created_at: session.created_at().as_datetime().to_rfc3339(),
            completed_at: session
                .completed_at()
                .map(|t| t.as_datetime().to_rfc3339()),
        }
    }
}

impl From<&Turn> for TurnResponse {
    fn from(turn: &Turn) -> Self {
        Self {
            speaker: turn.speaker,
            text: turn.text.clone(),
            stage: turn.stage,
            timestamp: turn.timestamp.as_datetime().to_rfc3339(),
            flagged: turn.flagged,
        }
    }
}

impl From<&RoomInfo> for RoomResponse {
    fn from(room: &RoomInfo) -> Self {
        Self {
            url: room.url.clone(),
            token: room.token.clone(),
        }
    }
}

impl From<ChatReply> for ChatResponse {
    fn from(reply: ChatReply) -> Self {
        Self {
            reply: reply.reply,
            stage: reply.stage,
            is_complete: reply.is_complete,
        }
    }
}

impl From<ChatReply> for GreetingResponse {
    fn from(reply: ChatReply) -> Self {
        Self {
            message: reply.reply,
            stage: reply.stage,
        }
    }
}
