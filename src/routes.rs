// src/routes.rs

use axum::{
    Json, Router,
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{exam, live, rooms},
    state::AppState,
    utils::jwt::auth_middleware,
};

/// Assembles the main application router.
///
/// * Merges the exam, room and live sub-routers.
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (store, live hub, config).
pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth = middleware::from_fn_with_state(state.clone(), auth_middleware);

    // Participant-facing, identity travels in the body
    let exam_routes = Router::new()
        .route("/{id}", get(exam::generate_paper))
        .route("/{id}/submit", post(exam::submit_paper));

    let room_routes = Router::new()
        .route("/open", get(rooms::list_open_rooms))
        .route("/open/stream", get(live::stream_open_rooms))
        .route("/{room_id}", get(rooms::get_room))
        // Protected room routes
        .merge(
            Router::new()
                .route("/", post(rooms::create_room))
                .route("/mine", get(rooms::list_my_rooms))
                .route("/mine/stream", get(live::stream_my_rooms))
                .route("/{room_id}/start", post(rooms::start_room))
                .route("/{room_id}/close", post(rooms::close_room))
                .route("/{room_id}/join", post(rooms::join_room))
                .route("/{room_id}/attempt", post(rooms::start_attempt))
                .route("/{room_id}/participants", get(rooms::list_participants))
                .route(
                    "/{room_id}/participants/stream",
                    get(live::stream_participants),
                )
                .route("/{room_id}/results", get(rooms::list_results))
                .layer(auth),
        );

    Router::new()
        .route(
            "/api/health",
            get(|| async { Json(serde_json::json!({ "status": "ok" })) }),
        )
        .nest("/api/exam", exam_routes)
        .nest("/api/rooms", room_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use super::*;
    use crate::{config::Config, repositories::MemoryStore};

    fn app() -> Router {
        let state = AppState::new(Arc::new(MemoryStore::new()), Config::for_tests("secret"));
        create_router(state)
    }

    #[tokio::test]
    async fn test_protected_routes_require_token() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/api/rooms/mine")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_malformed_submission_is_500_with_error_body() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/exam/R1/submit")
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_public_room_lookup_404() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/api/rooms/missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
