// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! Axum HTTP edge (§6). Thin transport over `orchestrator_core::ops`; no
//! workflow-lifecycle logic lives here that isn't shared with the worker.

pub mod error;
pub mod workflows;

use orchestrator_core::config::Settings;
use orchestrator_core::queue::JobQueue;
use orchestrator_core::state::StateStore;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub state: Arc<dyn StateStore>,
    pub queue: Arc<JobQueue>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(state: Arc<dyn StateStore>, queue: Arc<JobQueue>, settings: Arc<Settings>) -> Self {
        Self {
            state,
            queue,
            settings,
        }
    }

    /// Soft backpressure cap (§5): reject mutating requests with 503 once the
    /// queue is at or past `max_queue_size` rather than growing it unbounded.
    pub async fn check_queue_capacity(&self) -> Result<(), error::ApiError> {
        if self.queue.size().await >= self.settings.max_queue_size {
            tracing::warn!(
                max_queue_size = self.settings.max_queue_size,
                "rejecting request, queue at capacity"
            );
            return Err(error::ApiError::QueueFull);
        }
        Ok(())
    }
}

/// Build the full router with CORS and request tracing applied.
pub fn router(state: AppState) -> axum::Router {
    workflows::routes()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve `app` until the listener errors or the process is
/// signalled to stop. Thin wrapper so the CLI binary doesn't need a direct
/// `axum` dependency of its own.
pub async fn serve(addr: &str, app: axum::Router) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use orchestrator_core::state::FileStateStore;
    use tower::ServiceExt;

    async fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let state: Arc<dyn StateStore> = Arc::new(FileStateStore::new(dir.path().join("workflows")));
        let queue = Arc::new(JobQueue::load(dir.path().join("queue.json")).await.unwrap());
        (AppState::new(state, queue, Arc::new(Settings::default())), dir)
    }

    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        let (state, _dir) = test_state().await;
        let app = router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn get_missing_workflow_is_404() {
        let (state, _dir) = test_state().await;
        let app = router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/workflows/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let (state, _dir) = test_state().await;
        let app = router(state);

        let body = serde_json::json!({
            "id": "w1",
            "name": "demo",
            "status": "PENDING",
            "steps": [],
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z"
        });

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/workflows")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/workflows/w1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_duplicate_is_409() {
        let (state, _dir) = test_state().await;
        let app = router(state);

        let body = serde_json::json!({
            "id": "w1",
            "name": "demo",
            "status": "PENDING",
            "steps": [],
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z"
        });

        for expected in [StatusCode::CREATED, StatusCode::CONFLICT] {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri("/api/workflows")
                        .header("content-type", "application/json")
                        .body(Body::from(body.to_string()))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), expected);
        }
    }

    #[tokio::test]
    async fn create_with_empty_id_is_400() {
        let (state, _dir) = test_state().await;
        let app = router(state);

        let body = serde_json::json!({
            "id": "",
            "name": "demo",
            "status": "PENDING",
            "steps": [],
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z"
        });

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/workflows")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_with_path_separator_in_id_is_400() {
        let (state, _dir) = test_state().await;
        let app = router(state);

        let body = serde_json::json!({
            "id": "../escape",
            "name": "demo",
            "status": "PENDING",
            "steps": [],
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z"
        });

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/workflows")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
