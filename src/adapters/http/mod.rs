//! HTTP adapters - REST API implementations.

pub mod session;

use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::application::{SessionLifecycleManager, SessionRegistry};
use crate::config::ServerConfig;
use crate::ports::RoomService;

pub use session::{session_routes, SessionHandlers};

/// Assembles the API router: session endpoints, health probe, middleware.
pub fn api_router(
    registry: Arc<SessionRegistry>,
    lifecycle: Arc<SessionLifecycleManager>,
    rooms: Arc<dyn RoomService>,
    server: &ServerConfig,
) -> Router {
    let handlers = SessionHandlers::new(registry, lifecycle, rooms);

    let cors = if server.cors_origins_list().is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<http::HeaderValue> = server
            .cors_origins_list()
            .iter()
            .filter_map(|o| o.parse::<http::HeaderValue>().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .nest("/api/sessions", session_routes(handlers))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            server.request_timeout_secs,
        )))
        .layer(cors)
}

/// GET /health - Liveness probe
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
