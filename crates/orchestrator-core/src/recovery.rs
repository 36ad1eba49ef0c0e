// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! Recovery Manager (§4.5): runs synchronously at startup, before the
//! worker begins consuming, to reconcile on-disk state with the live queue.

use crate::dag::ready_steps;
use crate::error::Result;
use crate::model::JobStatus;
use crate::queue::{JobQueue, JobTicket};
use crate::state::StateStore;
use std::sync::Arc;

pub struct RecoveryManager {
    state: Arc<dyn StateStore>,
    queue: Arc<JobQueue>,
}

impl RecoveryManager {
    pub fn new(state: Arc<dyn StateStore>, queue: Arc<JobQueue>) -> Self {
        Self { state, queue }
    }

    /// Scan all persisted workflows, reset non-terminal steps, and re-seed
    /// the queue. Idempotent: running this twice in a row is a no-op on the
    /// second pass (§4.5, §8 property 5).
    pub async fn recover(&self) -> Result<()> {
        tracing::info!("starting crash recovery scan");

        let workflows = self.state.list().await?;
        let mut recovered_workflows = 0usize;
        let mut recovered_steps = 0usize;

        for mut workflow in workflows {
            let stuck = matches!(
                workflow.status,
                JobStatus::Running | JobStatus::Pending | JobStatus::WaitingForDependency
            );
            if !stuck {
                continue;
            }

            let mut needs_save = false;

            if workflow.status == JobStatus::Running {
                workflow.status = JobStatus::Pending;
                needs_save = true;
            }

            for step in workflow.steps.iter_mut() {
                match step.status {
                    JobStatus::Running => {
                        step.status = JobStatus::Pending;
                        step.error = None;
                        step.end_time = None;
                        step.log("Recovered from orphaned RUNNING state".to_string());
                        needs_save = true;
                        recovered_steps += 1;
                    }
                    JobStatus::WaitingForDependency => {
                        step.status = JobStatus::Pending;
                        step.log("Re-evaluating WAITING_FOR_DEPENDENCY step during recovery".to_string());
                        needs_save = true;
                        recovered_steps += 1;
                    }
                    _ => {}
                }
            }

            if needs_save {
                let existing: Vec<JobTicket> = self
                    .queue
                    .snapshot()
                    .await
                    .into_iter()
                    .filter(|t| t.workflow_id == workflow.id)
                    .collect();

                for step_id in ready_steps(&workflow) {
                    let already_queued = existing.iter().any(|t| t.node_id == step_id);
                    if !already_queued {
                        self.queue
                            .add(JobTicket::new(workflow.id.clone(), step_id.clone()))
                            .await?;
                    }
                    // Flip to WAITING_FOR_DEPENDENCY regardless of whether a
                    // fresh ticket was enqueued: a step whose ticket already
                    // existed is just as queued as one this pass just added,
                    // and leaving it PENDING here would make a second
                    // recovery pass re-enqueue it, breaking idempotence (§4.5, §8 property 5).
                    if let Some(step) = workflow.step_mut(&step_id) {
                        step.status = JobStatus::WaitingForDependency;
                        step.log("Re-queued during recovery".to_string());
                    }
                }

                workflow.recompute_progress();
                self.state.write(&mut workflow).await?;
                recovered_workflows += 1;
            }
        }

        let removed = self.cleanup_stale_queue_items().await?;

        tracing::info!(
            recovered_workflows,
            recovered_steps,
            stale_tickets_removed = removed,
            "recovery check complete"
        );
        Ok(())
    }

    /// Remove any ticket whose workflow no longer exists or whose step is
    /// already terminal (§4.5 step 6).
    async fn cleanup_stale_queue_items(&self) -> Result<usize> {
        let snapshot = self.queue.snapshot().await;
        let mut keep = Vec::with_capacity(snapshot.len());

        for ticket in snapshot {
            let valid = match self.state.get(&ticket.workflow_id).await {
                Ok(workflow) => workflow
                    .step(&ticket.node_id)
                    .map(|s| !s.status.is_terminal())
                    .unwrap_or(false),
                Err(_) => false,
            };
            keep.push((ticket, valid));
        }

        let stale: std::collections::HashSet<(String, String)> = keep
            .iter()
            .filter(|(_, valid)| !valid)
            .map(|(t, _)| (t.workflow_id.clone(), t.node_id.clone()))
            .collect();

        self.queue
            .retain(|t| !stale.contains(&(t.workflow_id.clone(), t.node_id.clone())))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Step, Workflow};
    use crate::state::FileStateStore;

    async fn setup() -> (Arc<FileStateStore>, Arc<JobQueue>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(FileStateStore::new(dir.path().join("workflows")));
        let queue = Arc::new(
            JobQueue::load(dir.path().join("queue.json"))
                .await
                .unwrap(),
        );
        (state, queue, dir)
    }

    #[tokio::test]
    async fn resets_orphaned_running_step_and_requeues() {
        let (state, queue, _dir) = setup().await;

        let mut wf = Workflow::new("w1", "orphan", vec![Step::new("a", "A", "sim")]);
        wf.status = JobStatus::Running;
        wf.step_mut("a").unwrap().status = JobStatus::Running;
        state.write(&mut wf).await.unwrap();

        let recovery = RecoveryManager::new(state.clone(), queue.clone());
        recovery.recover().await.unwrap();

        let recovered = state.get("w1").await.unwrap();
        assert_eq!(recovered.status, JobStatus::Pending);
        assert_eq!(recovered.step("a").unwrap().status, JobStatus::WaitingForDependency);
        assert_eq!(queue.size().await, 1);
    }

    #[tokio::test]
    async fn recovery_is_idempotent() {
        let (state, queue, _dir) = setup().await;

        let mut wf = Workflow::new("w1", "orphan", vec![Step::new("a", "A", "sim")]);
        wf.status = JobStatus::Running;
        wf.step_mut("a").unwrap().status = JobStatus::Running;
        state.write(&mut wf).await.unwrap();

        let recovery = RecoveryManager::new(state.clone(), queue.clone());
        recovery.recover().await.unwrap();
        let after_first = state.get("w1").await.unwrap();
        let queue_size_after_first = queue.size().await;

        recovery.recover().await.unwrap();
        let after_second = state.get("w1").await.unwrap();

        assert_eq!(after_first.status, after_second.status);
        assert_eq!(
            after_first.step("a").unwrap().status,
            after_second.step("a").unwrap().status
        );
        assert_eq!(queue_size_after_first, queue.size().await);
    }

    #[tokio::test]
    async fn drops_tickets_for_missing_workflows() {
        let (state, queue, _dir) = setup().await;
        queue
            .add(JobTicket::new("ghost", "a"))
            .await
            .unwrap();

        let recovery = RecoveryManager::new(state.clone(), queue.clone());
        recovery.recover().await.unwrap();

        assert_eq!(queue.size().await, 0);
    }
}
