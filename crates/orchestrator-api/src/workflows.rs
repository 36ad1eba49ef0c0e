// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! Workflow CRUD and lifecycle routes (§6).

use crate::error::ApiError;
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use orchestrator_core::model::Workflow;
use orchestrator_core::ops;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/workflows", get(list_workflows).post(create_workflow))
        .route("/api/workflows/from-template", post(create_from_template))
        .route("/api/workflows/:id", get(get_workflow))
        .route("/api/workflows/:id/stop", post(stop_workflow))
        .route("/api/workflows/:id/resume", post(resume_workflow))
        .route(
            "/api/workflows/:id/external-data",
            get(list_external_data).post(add_external_data),
        )
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    checks: HealthChecks,
}

#[derive(Serialize)]
struct HealthChecks {
    queue_size: usize,
    queue_at_capacity: bool,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let queue_size = state.queue.size().await;
    Json(HealthResponse {
        status: "ok",
        checks: HealthChecks {
            queue_size,
            queue_at_capacity: queue_size >= state.settings.max_queue_size,
        },
    })
}

async fn list_workflows(State(state): State<AppState>) -> Result<Json<Vec<Workflow>>, ApiError> {
    use orchestrator_core::state::StateStore;
    let workflows = state.state.list().await.map_err(ApiError::from)?;
    Ok(Json(workflows))
}

async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Workflow>, ApiError> {
    use orchestrator_core::state::StateStore;
    let workflow = state.state.get(&id).await.map_err(ApiError::from)?;
    Ok(Json(workflow))
}

/// Edge-only validation (§7 "edge error"): `id` becomes a directory name in
/// the file-backed State Store, so an empty id or one carrying a path
/// separator is rejected here, before anything is persisted, rather than
/// surfacing as an obscure io error out of `ops::create_workflow`.
fn validate_workflow_id(id: &str) -> Result<(), ApiError> {
    if id.is_empty() {
        return Err(ApiError::BadRequest(
            "workflow id must not be empty".to_string(),
        ));
    }
    if id.contains('/') || id.contains('\\') || id.contains("..") {
        return Err(ApiError::BadRequest(format!(
            "workflow id '{id}' must not contain path separators"
        )));
    }
    Ok(())
}

async fn create_workflow(
    State(state): State<AppState>,
    Json(workflow): Json<Workflow>,
) -> Result<(StatusCode, Json<Workflow>), ApiError> {
    validate_workflow_id(&workflow.id)?;
    state.check_queue_capacity().await?;
    let created = ops::create_workflow(&state.state, &state.queue, workflow).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Deserialize)]
struct CreateFromTemplateRequest {
    template_id: String,
    new_id: String,
    name: String,
    #[serde(default)]
    input_overlay: HashMap<String, Value>,
}

async fn create_from_template(
    State(state): State<AppState>,
    Json(req): Json<CreateFromTemplateRequest>,
) -> Result<(StatusCode, Json<Workflow>), ApiError> {
    validate_workflow_id(&req.new_id)?;
    state.check_queue_capacity().await?;
    let created = ops::create_from_template(
        &state.state,
        &state.queue,
        &req.template_id,
        req.new_id,
        req.name,
        req.input_overlay,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn stop_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Workflow>, ApiError> {
    let workflow = ops::stop_workflow(&state.state, &id).await?;
    Ok(Json(workflow))
}

async fn resume_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Workflow>, ApiError> {
    state.check_queue_capacity().await?;
    let workflow = ops::resume_workflow(&state.state, &state.queue, &id).await?;
    Ok(Json(workflow))
}

#[derive(Deserialize)]
struct ExternalDataRequest {
    #[serde(default)]
    step_name: Option<String>,
    content: Value,
    #[serde(default)]
    metadata: HashMap<String, Value>,
}

#[derive(Serialize)]
struct ExternalDataResponse {
    step_id: String,
    workflow_id: String,
    queued_dependents: usize,
    status: orchestrator_core::model::JobStatus,
}

async fn add_external_data(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ExternalDataRequest>,
) -> Result<Json<ExternalDataResponse>, ApiError> {
    state.check_queue_capacity().await?;
    let result = ops::add_external_data(
        &state.state,
        &state.queue,
        &id,
        req.step_name,
        req.content,
        req.metadata,
    )
    .await?;

    Ok(Json(ExternalDataResponse {
        step_id: result.step_id,
        workflow_id: result.workflow.id.clone(),
        queued_dependents: result.queued_dependents,
        status: result.workflow.status,
    }))
}

async fn list_external_data(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<orchestrator_core::model::Step>>, ApiError> {
    use orchestrator_core::state::StateStore;
    let workflow = state.state.get(&id).await.map_err(ApiError::from)?;

    let mut steps: Vec<_> = workflow
        .steps
        .into_iter()
        .filter(|s| s.action == ops::EXTERNAL_DATA_ACTION)
        .collect();
    steps.sort_by(|a, b| b.start_time.cmp(&a.start_time));
    Ok(Json(steps))
}
