// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! Edge-boundary error taxonomy (§7): validation failures return 4xx and are
//! never persisted; everything from the core is mapped to the status code
//! matching its taxonomy entry.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use orchestrator_core::CoreError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("queue is at capacity, try again later")]
    QueueFull,

    #[error("{0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Core(CoreError::WorkflowNotFound(_)) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Core(CoreError::WorkflowAlreadyExists(_)) => {
                (StatusCode::CONFLICT, self.to_string())
            }
            ApiError::Core(CoreError::Validation(_)) | ApiError::Core(CoreError::CyclicDependency(_)) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            ApiError::Core(CoreError::StepNotFound { .. }) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::QueueFull => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            ApiError::Core(_) => {
                tracing::error!(error = %self, "internal error serving request");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
