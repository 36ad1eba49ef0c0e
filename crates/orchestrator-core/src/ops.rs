// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! Workflow-lifecycle operations shared by the HTTP edge (§6): create,
//! stop, resume, and external-data ingestion. Kept in core so the edge
//! crate is a thin transport layer, not a second copy of this logic.

use crate::dag::{ready_steps, validate_acyclic};
use crate::error::{CoreError, Result};
use crate::model::{JobStatus, Step, Workflow};
use crate::queue::{JobQueue, JobTicket};
use crate::state::StateStore;
use std::collections::HashMap;
use std::sync::Arc;

/// Validate a freshly-submitted workflow document, assign defaults, persist
/// it, and enqueue its dependency-free steps (§6 `POST /api/workflows`).
pub async fn create_workflow(
    state: &Arc<dyn StateStore>,
    queue: &Arc<JobQueue>,
    mut workflow: Workflow,
) -> Result<Workflow> {
    if state.exists(&workflow.id).await? {
        return Err(CoreError::WorkflowAlreadyExists(workflow.id.clone()));
    }

    for step in workflow.steps.iter_mut() {
        step.status = JobStatus::Pending;
    }
    validate_acyclic(&workflow)?;

    workflow.status = JobStatus::Pending;
    workflow.progress = Some(0);

    for step_id in ready_steps(&workflow) {
        queue
            .add(JobTicket::new(workflow.id.clone(), step_id.clone()))
            .await?;
        if let Some(step) = workflow.step_mut(&step_id) {
            step.status = JobStatus::WaitingForDependency;
            step.log("Queued at creation as it has no dependencies".to_string());
        }
    }

    state.write(&mut workflow).await?;
    Ok(workflow)
}

/// Clone a template workflow's steps, resetting them to `PENDING` and
/// clearing timestamps/outputs/logs, and create the clone (§6 `from-template`).
pub async fn create_from_template(
    state: &Arc<dyn StateStore>,
    queue: &Arc<JobQueue>,
    template_id: &str,
    new_id: String,
    name: String,
    input_overlay: HashMap<String, serde_json::Value>,
) -> Result<Workflow> {
    let template = state.get(template_id).await?;

    let steps: Vec<Step> = template
        .steps
        .into_iter()
        .map(|mut s| {
            s.status = JobStatus::Pending;
            s.outputs = None;
            s.error = None;
            s.start_time = None;
            s.end_time = None;
            s.duration = None;
            s.logs = Vec::new();
            s.execution_metrics = None;
            for (k, v) in &input_overlay {
                s.params.insert(k.clone(), v.clone());
            }
            s
        })
        .collect();

    let mut workflow = Workflow::new(new_id, name, steps);
    workflow.parent_id = Some(template_id.to_string());

    create_workflow(state, queue, workflow.clone()).await?;
    workflow.status = JobStatus::Pending;
    state.get(&workflow.id).await
}

/// Apply cancellation semantics (§5, §6 `stop`): every active step becomes
/// `STOPPED`. In-flight adapter calls are not interrupted; the worker's
/// idempotency gate discards their outcome when they return.
pub async fn stop_workflow(state: &Arc<dyn StateStore>, workflow_id: &str) -> Result<Workflow> {
    let mut workflow = state.get(workflow_id).await?;

    if workflow.status.is_terminal() {
        return Ok(workflow);
    }

    workflow.status = JobStatus::Stopped;
    for step in workflow.steps.iter_mut() {
        if step.status.is_active() {
            step.status = JobStatus::Stopped;
            step.log("Manually stopped".to_string());
        }
    }

    state.write(&mut workflow).await?;
    Ok(workflow)
}

/// Reset `STOPPED`/`FAILED` steps (and their `PENDING`/`WAITING_FOR_DEPENDENCY`
/// kin) to `PENDING`, then re-enqueue the ones whose dependencies are met
/// (§6 `resume`).
pub async fn resume_workflow(
    state: &Arc<dyn StateStore>,
    queue: &Arc<JobQueue>,
    workflow_id: &str,
) -> Result<Workflow> {
    let mut workflow = state.get(workflow_id).await?;
    workflow.status = JobStatus::Pending;

    for step in workflow.steps.iter_mut() {
        if matches!(
            step.status,
            JobStatus::Pending | JobStatus::WaitingForDependency | JobStatus::Stopped | JobStatus::Failed
        ) {
            step.status = JobStatus::Pending;
            step.log("Reset to PENDING for resume".to_string());
        }
    }

    for step_id in ready_steps(&workflow) {
        queue
            .add(JobTicket::new(workflow.id.clone(), step_id.clone()))
            .await?;
        if let Some(step) = workflow.step_mut(&step_id) {
            step.status = JobStatus::WaitingForDependency;
            step.log("Re-queued on resume as dependencies are met".to_string());
        }
    }

    workflow.recompute_progress();
    state.write(&mut workflow).await?;
    Ok(workflow)
}

/// Sentinel action name used to mark external-data steps (§6 `GET .../external-data`).
pub const EXTERNAL_DATA_ACTION: &str = "external_data";

/// Outcome of `add_external_data`.
pub struct ExternalDataResult {
    pub step_id: String,
    pub queued_dependents: usize,
    pub workflow: Workflow,
}

/// Append a pre-`COMPLETED` step carrying an externally-ingested payload,
/// then re-evaluate and enqueue any newly-ready dependents (§6).
pub async fn add_external_data(
    state: &Arc<dyn StateStore>,
    queue: &Arc<JobQueue>,
    workflow_id: &str,
    step_name: Option<String>,
    content: serde_json::Value,
    metadata: HashMap<String, serde_json::Value>,
) -> Result<ExternalDataResult> {
    let mut workflow = state.get(workflow_id).await?;

    let step_id = format!("ext_{}", uuid::Uuid::new_v4().simple());
    let now = chrono::Utc::now();

    let mut outputs = HashMap::new();
    outputs.insert("content".to_string(), content);
    outputs.insert(
        "capturedAt".to_string(),
        serde_json::Value::String(now.to_rfc3339()),
    );

    let mut step = Step::new(
        step_id.clone(),
        step_name.unwrap_or_else(|| "External Data".to_string()),
        EXTERNAL_DATA_ACTION,
    );
    step.status = JobStatus::Completed;
    step.outputs = Some(outputs);
    step.start_time = Some(now);
    step.end_time = Some(now);
    step.duration = Some("0 sec".to_string());
    step.logs.push("External data ingested".to_string());
    step.metadata = metadata;

    workflow.steps.push(step);

    let queued_dependents = ready_steps(&workflow).len();
    for id in ready_steps(&workflow) {
        queue
            .add(JobTicket::new(workflow.id.clone(), id.clone()))
            .await?;
        if let Some(s) = workflow.step_mut(&id) {
            s.status = JobStatus::WaitingForDependency;
            s.log("Queued due to external data dependency satisfaction".to_string());
        }
    }

    if workflow.status == JobStatus::Pending && queued_dependents > 0 {
        workflow.status = JobStatus::Running;
    }
    workflow.recompute_progress();
    state.write(&mut workflow).await?;

    Ok(ExternalDataResult {
        step_id,
        queued_dependents,
        workflow,
    })
}
