// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! The worker loop (§4.4): a single cooperative task that pulls one job at a
//! time, validates it, transitions the step, invokes the adapter, persists
//! results, and enqueues newly-ready successor steps.

use crate::adapter::AdapterRegistry;
use crate::dag::{ready_steps, WorkflowDag};
use crate::model::{JobStatus, OnFailure, Workflow};
use crate::queue::{JobQueue, JobTicket};
use crate::state::StateStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Sleep when the queue is empty (§4.4 step 1).
const IDLE_SLEEP: Duration = Duration::from_secs(1);
/// Sleep after deferring a ticket for an unmet dependency (§4.4 step 5).
const DEFERRED_SLEEP: Duration = Duration::from_secs(2);
/// Sleep after an outer-loop exception, e.g. a queue read failure (§4.4, §7).
const ERROR_SLEEP: Duration = Duration::from_secs(5);

/// One cooperative worker over a shared state store, job queue, and adapter registry.
pub struct Worker {
    state: Arc<dyn StateStore>,
    queue: Arc<JobQueue>,
    adapters: Arc<AdapterRegistry>,
}

/// Human-readable duration per §4.4 step 8: `"N sec"`, `"N min M sec"`, `"N hr M min"`.
pub fn format_duration(start: chrono::DateTime<Utc>, end: chrono::DateTime<Utc>) -> String {
    let total_seconds = (end - start).num_seconds().max(0);
    if total_seconds < 60 {
        format!("{} sec", total_seconds)
    } else if total_seconds < 3600 {
        format!("{} min {} sec", total_seconds / 60, total_seconds % 60)
    } else {
        format!("{} hr {} min", total_seconds / 3600, (total_seconds % 3600) / 60)
    }
}

impl Worker {
    pub fn new(
        state: Arc<dyn StateStore>,
        queue: Arc<JobQueue>,
        adapters: Arc<AdapterRegistry>,
    ) -> Self {
        Self {
            state,
            queue,
            adapters,
        }
    }

    /// Run forever. Callers typically spawn this as its own tokio task.
    pub async fn run(&self) -> ! {
        tracing::info!("worker started");
        loop {
            if let Err(err) = self.tick().await {
                tracing::error!(error = %err, "worker iteration failed, backing off");
                tokio::time::sleep(ERROR_SLEEP).await;
            }
        }
    }

    /// Run until the queue is empty and stays empty for one poll. Useful for
    /// tests and for draining a workflow deterministically.
    pub async fn drain(&self) {
        loop {
            let had_work = self.tick_once().await;
            if !had_work {
                break;
            }
        }
    }

    async fn tick(&self) -> crate::error::Result<()> {
        self.tick_once().await;
        Ok(())
    }

    /// One iteration of the §4.4 loop. Returns whether a ticket was processed
    /// (used by `drain` to know when the queue is exhausted).
    async fn tick_once(&self) -> bool {
        let ticket = match self.queue.next().await {
            Ok(Some(t)) => t,
            Ok(None) => {
                tokio::time::sleep(IDLE_SLEEP).await;
                return false;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to read from job queue");
                tokio::time::sleep(ERROR_SLEEP).await;
                return false;
            }
        };

        self.process_ticket(ticket).await;
        true
    }

    async fn process_ticket(&self, ticket: JobTicket) {
        let JobTicket {
            workflow_id,
            node_id,
            ..
        } = ticket.clone();

        let mut workflow = match self.state.get(&workflow_id).await {
            Ok(w) => w,
            Err(_) => {
                tracing::warn!(%workflow_id, %node_id, "stale ticket: workflow not found, discarding");
                return;
            }
        };

        if workflow.step(&node_id).is_none() {
            tracing::warn!(%workflow_id, %node_id, "stale ticket: step not found, discarding");
            return;
        }

        // Idempotency gate (§4.4 step 4): terminal steps are immune to dequeue.
        let status = workflow.step(&node_id).unwrap().status;
        if status.is_terminal() {
            tracing::debug!(%workflow_id, %node_id, ?status, "step already terminal, discarding ticket");
            return;
        }

        // Dependency gate (§4.4 step 5).
        let deps_met = {
            let step = workflow.step(&node_id).unwrap();
            step.dependencies.iter().all(|dep| {
                workflow
                    .step(dep)
                    .map(|d| d.status == JobStatus::Completed)
                    .unwrap_or(false)
            })
        };
        if !deps_met {
            if let Err(err) = self.queue.requeue_deferred(ticket).await {
                tracing::error!(%workflow_id, %node_id, error = %err, "failed to requeue deferred ticket");
            }
            tokio::time::sleep(DEFERRED_SLEEP).await;
            return;
        }

        self.run_step(&mut workflow, &node_id).await;
    }

    /// Steps 6-12 of §4.4: transition to RUNNING, invoke the adapter, persist
    /// the outcome, cascade or fan out, and recompute workflow-level fields.
    async fn run_step(&self, workflow: &mut Workflow, node_id: &str) {
        let now = Utc::now();
        {
            let step = workflow.step_mut(node_id).unwrap();
            step.status = JobStatus::Running;
            step.start_time = Some(now);
            step.log(format!("Started execution at {}", now.to_rfc3339()));
        }
        if !matches!(workflow.status, JobStatus::Running | JobStatus::Failed) {
            workflow.status = JobStatus::Running;
        }
        if let Err(err) = self.state.write(workflow).await {
            tracing::error!(workflow_id = %workflow.id, error = %err, "failed to persist RUNNING transition");
        }

        let (action, params) = {
            let step = workflow.step(node_id).unwrap();
            (step.action.clone(), step.params.clone())
        };

        let outcome = self.adapters.call(&action, &params).await;

        // The adapter call is never interrupted (§5); by the time it returns,
        // a concurrent operator stop (or other edge mutation) may already
        // have persisted a different status for this step. Re-read the
        // on-disk document and discard the outcome outright unless the step
        // is still RUNNING, rather than clobbering a STOPPED step back to
        // COMPLETED/FAILED.
        let workflow_id = workflow.id.clone();
        match self.state.get(&workflow_id).await {
            Ok(fresh) => *workflow = fresh,
            Err(err) => {
                tracing::warn!(workflow_id = %workflow_id, node_id, error = %err, "workflow vanished while adapter was in flight, discarding outcome");
                return;
            }
        }
        match workflow.step(node_id) {
            Some(step) if step.status == JobStatus::Running => {}
            _ => {
                tracing::info!(workflow_id = %workflow_id, node_id, "step no longer RUNNING after adapter returned, discarding outcome");
                return;
            }
        }

        let end = Utc::now();
        let start = workflow.step(node_id).unwrap().start_time.unwrap_or(end);
        let duration = format_duration(start, end);

        let execution_metrics = crate::model::ExecutionMetrics {
            tokens: outcome
                .metadata
                .get("tokens")
                .and_then(|v| v.as_u64()),
            cost: outcome.metadata.get("cost").and_then(|v| v.as_f64()),
            model: outcome
                .metadata
                .get("model")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            duration_ms: outcome
                .metadata
                .get("duration_ms")
                .and_then(|v| v.as_f64()),
        };
        let has_known_metrics = execution_metrics.tokens.is_some()
            || execution_metrics.cost.is_some()
            || execution_metrics.model.is_some()
            || execution_metrics.duration_ms.is_some();

        let on_failure = workflow.step(node_id).unwrap().on_failure;

        {
            let step = workflow.step_mut(node_id).unwrap();
            step.end_time = Some(end);
            step.duration = Some(duration);
            step.metadata = outcome
                .metadata
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            if has_known_metrics {
                step.execution_metrics = Some(execution_metrics);
            }

            match outcome.error {
                Some(error) => {
                    step.status = JobStatus::Failed;
                    step.log(format!("Failed: {}", error));
                    step.error = Some(error);
                }
                None => {
                    step.status = JobStatus::Completed;
                    step.log(format!("Completed successfully at {}", end.to_rfc3339()));
                    step.outputs = outcome.output;
                }
            }
        }

        let failed = workflow.step(node_id).unwrap().status == JobStatus::Failed;

        if failed {
            if on_failure == OnFailure::StopWorkflow {
                workflow.status = JobStatus::Failed;
                self.cascade_stop(workflow, node_id);
            }
        } else {
            self.fan_out_ready_successors(workflow).await;
        }

        self.finalize_workflow_status(workflow);
        workflow.recompute_metrics();
        workflow.recompute_progress();
        if workflow.status == JobStatus::Completed {
            workflow.progress = Some(100);
        }

        if let Err(err) = self.state.write(workflow).await {
            tracing::error!(workflow_id = %workflow.id, error = %err, "failed to persist step outcome");
        }

        tracing::info!(
            workflow_id = %workflow.id,
            node_id,
            status = ?workflow.step(node_id).unwrap().status,
            "job completed"
        );
    }

    /// Mark every transitive successor still in `{PENDING, WAITING_FOR_DEPENDENCY}`
    /// as `STOPPED` (§4.4 step 9, cascade).
    fn cascade_stop(&self, workflow: &mut Workflow, failed_step_id: &str) {
        let dag = match WorkflowDag::from_workflow(workflow) {
            Ok(dag) => dag,
            Err(err) => {
                tracing::error!(workflow_id = %workflow.id, error = %err, "failed to build dag for cascade");
                return;
            }
        };
        let successors = dag.transitive_successors(failed_step_id);
        for id in successors {
            if let Some(step) = workflow.step_mut(&id) {
                if matches!(step.status, JobStatus::Pending | JobStatus::WaitingForDependency) {
                    step.status = JobStatus::Stopped;
                    step.log("Stopped: upstream stop_workflow failure".to_string());
                }
            }
        }
    }

    /// Enqueue every newly-ready step and flip it to `WAITING_FOR_DEPENDENCY` (§4.4 step 10).
    async fn fan_out_ready_successors(&self, workflow: &mut Workflow) {
        for step_id in ready_steps(workflow) {
            if let Err(err) = self
                .queue
                .add(JobTicket::new(workflow.id.clone(), step_id.clone()))
                .await
            {
                tracing::error!(workflow_id = %workflow.id, step_id, error = %err, "failed to enqueue ready successor");
                continue;
            }
            if let Some(step) = workflow.step_mut(&step_id) {
                step.status = JobStatus::WaitingForDependency;
                step.log("Queued as its dependencies are now met".to_string());
            }
        }
    }

    /// §4.4 step 11: if no step remains active, the workflow is terminal.
    fn finalize_workflow_status(&self, workflow: &mut Workflow) {
        let any_active = workflow.steps.iter().any(|s| s.status.is_active());
        if any_active {
            return;
        }
        // Any failed step marks the workflow FAILED at finalization, even one
        // whose own on_failure policy is `continue` (it only spares its
        // siblings from cascading, not the workflow's own terminal status).
        let any_failed = workflow.steps.iter().any(|s| s.status == JobStatus::Failed);
        workflow.status = if any_failed {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Step;
    use crate::state::FileStateStore;

    struct SlowAdapter;

    #[async_trait::async_trait]
    impl crate::adapter::Adapter for SlowAdapter {
        async fn call(
            &self,
            _params: &std::collections::HashMap<String, serde_json::Value>,
        ) -> crate::adapter::AdapterOutcome {
            tokio::time::sleep(Duration::from_millis(50)).await;
            crate::adapter::AdapterOutcome::success(Default::default(), Default::default())
        }
    }

    #[tokio::test]
    async fn concurrent_stop_during_adapter_call_is_not_clobbered() {
        let dir = tempfile::tempdir().unwrap();
        let state: Arc<dyn StateStore> =
            Arc::new(FileStateStore::new(dir.path().join("workflows")));
        let queue = Arc::new(JobQueue::load(dir.path().join("queue.json")).await.unwrap());

        let wf = Workflow::new("w1", "concurrent", vec![Step::new("a", "A", "slow")]);
        crate::ops::create_workflow(&state, &queue, wf).await.unwrap();

        let mut registry = AdapterRegistry::new();
        registry.register("slow", Arc::new(SlowAdapter));
        let worker = Worker::new(state.clone(), queue.clone(), Arc::new(registry));

        let worker_task = tokio::spawn(async move {
            worker.drain().await;
        });

        // Let the worker dequeue the ticket and enter the adapter call, then
        // stop the workflow while it's still in flight.
        tokio::time::sleep(Duration::from_millis(10)).await;
        crate::ops::stop_workflow(&state, "w1").await.unwrap();

        worker_task.await.unwrap();

        let result = state.get("w1").await.unwrap();
        assert_eq!(result.status, JobStatus::Stopped);
        assert_eq!(result.step("a").unwrap().status, JobStatus::Stopped);
    }
}
