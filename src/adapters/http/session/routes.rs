//! HTTP routes for intake session endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    create_session, delete_session, get_greeting, get_session, get_session_room,
    send_chat_message, SessionHandlers,
};

/// Creates the session router with all endpoints.
pub fn session_routes(handlers: SessionHandlers) -> Router {
    Router::new()
        .route("/", post(create_session))
        .route("/:id", get(get_session).delete(delete_session))
        .route("/:id/room", get(get_session_room))
        .route("/:id/greeting", get(get_greeting))
        .route("/:id/chat", post(send_chat_message))
        .with_state(handlers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ai::{MockAgent, MockExtractor};
    use crate::adapters::speech::{MockStt, MockTts};
    use crate::adapters::transport::{MockRoomService, MockTransport};
    use crate::application::{LifecyclePolicy, SessionLifecycleManager, SessionRegistry};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn router() -> (Router, Arc<SessionRegistry>) {
        let registry = Arc::new(SessionRegistry::new());
        let lifecycle = Arc::new(SessionLifecycleManager::new(
            Arc::clone(&registry),
            Arc::new(MockTransport::new()),
            Arc::new(MockStt::new()),
            Arc::new(MockTts::new()),
            Arc::new(MockAgent::new()),
            Arc::new(MockExtractor::new()),
            LifecyclePolicy::default(),
        ));
        let handlers = SessionHandlers::new(
            Arc::clone(&registry),
            lifecycle,
            Arc::new(MockRoomService::new()),
        );
        (session_routes(handlers), registry)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn create_session_returns_room_details() {
        let (router, registry) = router();

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let json = body_json(response).await;
        assert!(json["session_id"].is_string());
        assert_eq!(json["room_url"], "https://rooms.test/mock");
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn get_unknown_session_is_404() {
        let (router, _) = router();
        let missing = crate::domain::foundation::SessionId::new();

        let response = router
            .oneshot(
                Request::builder()
                    .uri(format!("/{missing}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["error"], "not_found");
    }

    #[tokio::test]
    async fn malformed_session_id_is_400() {
        let (router, _) = router();

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/not-a-uuid")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    async fn create(router: &Router) -> String {
        let created = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        body_json(created).await["session_id"]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn greeting_opens_the_chat_conversation() {
        let (router, _) = router();
        let id = create(&router).await;

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/{id}/greeting"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert!(json["message"].as_str().unwrap().contains("MedVoice"));
        assert_eq!(json["stage"], "DEMOGRAPHICS");

        // The greeting is delivered once.
        let repeat = router
            .oneshot(
                Request::builder()
                    .uri(format!("/{id}/greeting"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(repeat.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn chat_turn_returns_the_next_prompt() {
        let (router, registry) = router();
        let id = create(&router).await;

        router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/{id}/greeting"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/{id}/chat"))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"message": "hello there"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert!(!json["reply"].as_str().unwrap().is_empty());
        assert_eq!(json["stage"], "DEMOGRAPHICS");
        assert_eq!(json["is_complete"], false);

        // Both turns landed in the session history.
        let session_id: crate::domain::foundation::SessionId = id.parse().unwrap();
        let session = registry.get(&session_id).await.unwrap();
        assert!(session
            .history()
            .iter()
            .any(|t| t.text.contains("hello there")));
    }

    #[tokio::test]
    async fn empty_chat_message_is_422() {
        let (router, _) = router();
        let id = create(&router).await;

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/{id}/chat"))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"message": "   "}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn delete_session_stops_and_removes_it() {
        let (router, registry) = router();

        let created = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let id = body_json(created).await["session_id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = router
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(registry.len().await, 0);
    }
}
