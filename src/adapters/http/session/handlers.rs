//! HTTP handlers for intake session endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, info, warn};

use crate::application::{SessionLifecycleManager, SessionRegistry};
use crate::domain::foundation::SessionId;
use crate::domain::session::SessionError;
use crate::ports::RoomService;

use super::dto::{
    ChatRequest, ChatResponse, CreateSessionResponse, ErrorResponse, GreetingResponse,
    RoomResponse, SessionResponse,
};

// ════════════════════════════════════════════════════════════════════════════
// Handler state
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct SessionHandlers {
    registry: Arc<SessionRegistry>,
    lifecycle: Arc<SessionLifecycleManager>,
    rooms: Arc<dyn RoomService>,
}

impl SessionHandlers {
    pub fn new(
        registry: Arc<SessionRegistry>,
        lifecycle: Arc<SessionLifecycleManager>,
        rooms: Arc<dyn RoomService>,
    ) -> Self {
        Self {
            registry,
            lifecycle,
            rooms,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// HTTP handlers
// ════════════════════════════════════════════════════════════════════════════

/// POST /api/sessions - Provision a room, register a session, start the bot
pub async fn create_session(State(handlers): State<SessionHandlers>) -> Response {
    let room = match handlers.rooms.create_room().await {
        Ok(room) => room,
        Err(e) => {
            error!(error = %e, "room provisioning failed");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse::service_unavailable(
                    "could not provision a room",
                )),
            )
                .into_response();
        }
    };

    let session = handlers.registry.create(room.clone()).await;
    let id = *session.id();

    // A session whose bot failed to start is still joinable and deletable;
    // the client sees the room either way.
    if let Err(e) = handlers.lifecycle.start(id).await {
        warn!(session_id = %id, error = %e, "bot start failed");
    }

    info!(session_id = %id, "session created");
    let response = CreateSessionResponse {
        session_id: id.to_string(),
        room_url: room.url,
        token: room.token,
    };
    (StatusCode::CREATED, Json(response)).into_response()
}

/// GET /api/sessions/:id - Current session snapshot
pub async fn get_session(
    State(handlers): State<SessionHandlers>,
    Path(session_id): Path<String>,
) -> Response {
    let id = match parse_id(&session_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match handlers.registry.get(&id).await {
        Ok(session) => (StatusCode::OK, Json(SessionResponse::from(&session))).into_response(),
        Err(e) => handle_session_error(e),
    }
}

/// GET /api/sessions/:id/room - Connection info for an existing session
pub async fn get_session_room(
    State(handlers): State<SessionHandlers>,
    Path(session_id): Path<String>,
) -> Response {
    let id = match parse_id(&session_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match handlers.registry.room_info(&id).await {
        Ok(room) => (StatusCode::OK, Json(RoomResponse::from(&room))).into_response(),
        Err(e) => handle_session_error(e),
    }
}

/// GET /api/sessions/:id/greeting - Opening line for a text-chat session
pub async fn get_greeting(
    State(handlers): State<SessionHandlers>,
    Path(session_id): Path<String>,
) -> Response {
    let id = match parse_id(&session_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match handlers.lifecycle.greeting(id).await {
        Ok(reply) => (StatusCode::OK, Json(GreetingResponse::from(reply))).into_response(),
        Err(e) => handle_session_error(e),
    }
}

/// POST /api/sessions/:id/chat - One text-chat turn against the intake flow
pub async fn send_chat_message(
    State(handlers): State<SessionHandlers>,
    Path(session_id): Path<String>,
    Json(request): Json<ChatRequest>,
) -> Response {
    let id = match parse_id(&session_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match handlers.lifecycle.chat(id, &request.message).await {
        Ok(reply) => (StatusCode::OK, Json(ChatResponse::from(reply))).into_response(),
        Err(e) => handle_session_error(e),
    }
}

/// DELETE /api/sessions/:id - Stop the bot and remove the session
pub async fn delete_session(
    State(handlers): State<SessionHandlers>,
    Path(session_id): Path<String>,
) -> Response {
    let id = match parse_id(&session_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match handlers.lifecycle.stop(id).await {
        Ok(status) => {
            handlers.registry.delete(&id).await;
            info!(session_id = %id, status = %status, "session deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => handle_session_error(e),
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════════════

fn parse_id(raw: &str) -> Result<SessionId, Response> {
    raw.parse::<SessionId>().map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::bad_request("invalid session id")),
        )
            .into_response()
    })
}

fn handle_session_error(error: SessionError) -> Response {
    match error {
        SessionError::NotFound { .. } => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::not_found("session not found")),
        )
            .into_response(),
        SessionError::AlreadyTerminal { .. } => (
            StatusCode::CONFLICT,
            Json(ErrorResponse::new("conflict", error.to_string())),
        )
            .into_response(),
        SessionError::InvalidStageTransition { .. } | SessionError::Validation(_) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse::new("unprocessable", error.to_string())),
        )
            .into_response(),
    }
}
