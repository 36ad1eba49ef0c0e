// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! Error types for the orchestration core.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Main error type for the execution core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Workflow validation error (cycle, dangling dependency, duplicate id).
    #[error("workflow validation failed: {0}")]
    Validation(String),

    /// Cyclic dependency detected while building the DAG.
    #[error("cyclic dependency detected in workflow {0}")]
    CyclicDependency(String),

    /// Requested workflow does not exist in the state store.
    #[error("workflow '{0}' not found")]
    WorkflowNotFound(String),

    /// A workflow document with this id already exists.
    #[error("workflow '{0}' already exists")]
    WorkflowAlreadyExists(String),

    /// Step not found in a workflow.
    #[error("step '{step_id}' not found in workflow '{workflow_id}'")]
    StepNotFound { workflow_id: String, step_id: String },

    /// State store read/write failure.
    #[error("state store error: {0}")]
    StateStore(String),

    /// Job queue read/write failure.
    #[error("job queue error: {0}")]
    Queue(String),

    /// Adapter-level failure surfaced as a step error (never aborts the worker).
    #[error("adapter '{action}' failed: {message}")]
    Adapter { action: String, message: String },

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    pub fn state_store<S: Into<String>>(msg: S) -> Self {
        Self::StateStore(msg.into())
    }

    pub fn queue<S: Into<String>>(msg: S) -> Self {
        Self::Queue(msg.into())
    }
}
