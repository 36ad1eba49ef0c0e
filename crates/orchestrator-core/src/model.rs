// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! Workflow and step data model (§3 of the workflow document schema).
//!
//! Every wire field uses lower-camelCase; unknown keys round-trip through
//! `extra` so an edge that adds a field the core doesn't know about yet
//! doesn't lose it on the next read-modify-write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Six-variant status shared by `Workflow` and `Step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "WAITING_FOR_DEPENDENCY")]
    WaitingForDependency,
    #[serde(rename = "STOPPED")]
    Stopped,
}

impl JobStatus {
    /// Terminal states are immune to dequeue (§4.4 idempotency gate).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Pending | Self::Running | Self::WaitingForDependency
        )
    }
}

/// Failure propagation policy for a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnFailure {
    StopWorkflow,
    Continue,
}

impl Default for OnFailure {
    fn default() -> Self {
        Self::StopWorkflow
    }
}

fn default_on_failure() -> OnFailure {
    OnFailure::default()
}

/// Per-step execution metrics mirrored from adapter metadata (§4.3).
/// Key names match the adapter metadata keys verbatim (`duration_ms`, not
/// `durationMs`) since they are passed through from adapter JSON, not
/// generated by the camelCase wire convention used for model fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
}

/// Aggregated workflow-level metrics (§4.4 step 11).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowMetrics {
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub total_cost: f64,
}

/// A node in the DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,
    pub name: String,
    pub action: String,
    pub status: JobStatus,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub params: HashMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<HashMap<String, serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_metrics: Option<ExecutionMetrics>,
    #[serde(default = "default_on_failure")]
    pub on_failure: OnFailure,

    /// Unrecognized fields, preserved verbatim on read-modify-write (§4.1).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Step {
    pub fn new(id: impl Into<String>, name: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            action: action.into(),
            status: JobStatus::Pending,
            dependencies: Vec::new(),
            params: HashMap::new(),
            outputs: None,
            error: None,
            start_time: None,
            end_time: None,
            duration: None,
            logs: Vec::new(),
            metadata: HashMap::new(),
            execution_metrics: None,
            on_failure: OnFailure::default(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn log(&mut self, line: impl Into<String>) {
        self.logs.push(line.into());
    }
}

/// A named alternate continuation, used by `from-template` instantiation (§6).
pub type Branch = HashMap<String, String>;

/// The top-level aggregate (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: String,
    pub name: String,
    pub status: JobStatus,
    pub steps: Vec<Step>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<Branch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<WorkflowMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_breakdown: Option<HashMap<String, f64>>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,

    /// Unrecognized fields, preserved verbatim on read-modify-write (§4.1).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Workflow {
    pub fn new(id: impl Into<String>, name: impl Into<String>, steps: Vec<Step>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            status: JobStatus::Pending,
            steps,
            created_at: now,
            updated_at: now,
            description: None,
            tags: Vec::new(),
            progress: Some(0),
            parent_id: None,
            branches: Vec::new(),
            metrics: None,
            cost_breakdown: None,
            metadata: HashMap::new(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn step(&self, step_id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    pub fn step_mut(&mut self, step_id: &str) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.id == step_id)
    }

    /// `progress = floor(100 * |COMPLETED| / |steps|)`, or 0 if there are no steps (§3 invariant).
    pub fn recompute_progress(&mut self) {
        if self.steps.is_empty() {
            self.progress = Some(0);
            return;
        }
        let completed = self
            .steps
            .iter()
            .filter(|s| s.status == JobStatus::Completed)
            .count();
        let pct = (100 * completed / self.steps.len()) as u8;
        self.progress = Some(pct);
    }

    /// Recompute `metrics` / `cost_breakdown` from each step's `execution_metrics` (§4.4 step 11).
    pub fn recompute_metrics(&mut self) {
        let mut total_tokens = 0u64;
        let mut total_cost = 0.0f64;
        let mut breakdown: HashMap<String, f64> = HashMap::new();

        for step in &self.steps {
            if let Some(m) = &step.execution_metrics {
                if let Some(tokens) = m.tokens {
                    total_tokens += tokens;
                }
                if let Some(cost) = m.cost {
                    total_cost += cost;
                    let model = m.model.clone().unwrap_or_else(|| "unknown".to_string());
                    *breakdown.entry(model).or_insert(0.0) += cost;
                }
            }
        }

        self.metrics = Some(WorkflowMetrics {
            total_tokens,
            total_cost,
        });
        self.cost_breakdown = if breakdown.is_empty() {
            None
        } else {
            Some(breakdown)
        };
    }
}
