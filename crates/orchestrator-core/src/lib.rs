// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! Durable DAG workflow execution core.
//!
//! This crate owns the persistent job queue, the dependency-driven
//! scheduler, the per-workflow state machine, the worker loop, and the
//! crash-recovery procedure. HTTP transport, concrete adapters, and process
//! wiring live in sibling crates (`orchestrator-api`, `orchestrator-adapters`,
//! `orchestrator-cli`); this crate only depends on the adapter trait, never
//! a concrete implementation.
//!
//! # Example
//!
//! ```no_run
//! use orchestrator_core::adapter::AdapterRegistry;
//! use orchestrator_core::model::{Step, Workflow};
//! use orchestrator_core::queue::JobQueue;
//! use orchestrator_core::recovery::RecoveryManager;
//! use orchestrator_core::state::{FileStateStore, StateStore};
//! use orchestrator_core::worker::Worker;
//! use std::sync::Arc;
//!
//! # async fn run() -> orchestrator_core::error::Result<()> {
//! let state: Arc<dyn StateStore> = Arc::new(FileStateStore::new("workflows"));
//! let queue = Arc::new(JobQueue::load("queue-state.json").await?);
//! let adapters = Arc::new(AdapterRegistry::new());
//!
//! RecoveryManager::new(state.clone(), queue.clone()).recover().await?;
//!
//! let wf = Workflow::new("w1", "demo", vec![Step::new("a", "A", "sim")]);
//! orchestrator_core::ops::create_workflow(&state, &queue, wf).await?;
//!
//! let worker = Worker::new(state, queue, adapters);
//! worker.drain().await;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod config;
pub mod dag;
pub mod error;
pub mod model;
pub mod ops;
pub mod queue;
pub mod recovery;
pub mod state;
pub mod worker;

pub use error::{CoreError, Result};
pub use model::{JobStatus, OnFailure, Step, Workflow};
