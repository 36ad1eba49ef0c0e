// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! Durable FIFO job queue (§4.2), persisted as a single JSON file.
//!
//! Every mutation rewrites the whole file under an atomic rename and holds
//! a process-wide mutex for the duration of the load-mutate-persist cycle,
//! resolving the open question in §9 about the original's unguarded queue.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::Mutex;

/// A `(workflow_id, step_id)` pair representing pending work.
///
/// Serialized on the wire as `{workflow_id, node_id}` (§3, §6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTicket {
    pub workflow_id: String,
    pub node_id: String,
    /// Incremented each time the worker re-enqueues this ticket for a
    /// deferred dependency (§4.2 redelivery bound, §9).
    #[serde(default)]
    pub redeliveries: u32,
}

impl JobTicket {
    pub fn new(workflow_id: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            node_id: node_id.into(),
            redeliveries: 0,
        }
    }
}

/// Default cap on redeliveries before a ticket is dropped with a logged
/// warning instead of cycling forever (§4.2, §9).
pub const DEFAULT_REDELIVERY_LIMIT: u32 = 100;

/// Durable FIFO over a single JSON file.
pub struct JobQueue {
    path: PathBuf,
    redelivery_limit: u32,
    inner: Mutex<Vec<JobTicket>>,
}

impl JobQueue {
    /// Load the queue from disk, or start empty if the file doesn't exist.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let tickets = if tokio::fs::try_exists(&path).await? {
            let bytes = tokio::fs::read(&path).await?;
            serde_json::from_slice(&bytes).unwrap_or_else(|err| {
                tracing::error!(error = %err, "failed to parse queue file, starting empty");
                Vec::new()
            })
        } else {
            Vec::new()
        };

        Ok(Self {
            path,
            redelivery_limit: DEFAULT_REDELIVERY_LIMIT,
            inner: Mutex::new(tickets),
        })
    }

    pub fn with_redelivery_limit(mut self, limit: u32) -> Self {
        self.redelivery_limit = limit;
        self
    }

    async fn persist(&self, tickets: &[JobTicket]) -> Result<()> {
        let tmp_path = self
            .path
            .with_extension(format!("tmp.{}", uuid::Uuid::new_v4()));
        let bytes = serde_json::to_vec_pretty(tickets)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&tmp_path, &bytes).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    /// Enqueue a fresh ticket (best-effort dedup against the current snapshot, §4.2).
    pub async fn add(&self, ticket: JobTicket) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let already_queued = guard
            .iter()
            .any(|t| t.workflow_id == ticket.workflow_id && t.node_id == ticket.node_id);
        if already_queued {
            tracing::debug!(
                workflow_id = %ticket.workflow_id,
                node_id = %ticket.node_id,
                "ticket already queued, skipping duplicate enqueue"
            );
            return Ok(());
        }
        guard.push(ticket);
        self.persist(&guard).await
    }

    /// Re-add a ticket deferred for an unmet dependency, bumping its
    /// redelivery counter. Drops the ticket past `redelivery_limit`.
    pub async fn requeue_deferred(&self, mut ticket: JobTicket) -> Result<()> {
        ticket.redeliveries += 1;
        if ticket.redeliveries > self.redelivery_limit {
            tracing::warn!(
                workflow_id = %ticket.workflow_id,
                node_id = %ticket.node_id,
                redeliveries = ticket.redeliveries,
                "dropping ticket past redelivery limit, possible stuck dependency"
            );
            return Ok(());
        }
        let mut guard = self.inner.lock().await;
        guard.push(ticket);
        self.persist(&guard).await
    }

    /// Pop the next ticket, FIFO.
    pub async fn next(&self) -> Result<Option<JobTicket>> {
        let mut guard = self.inner.lock().await;
        if guard.is_empty() {
            return Ok(None);
        }
        let ticket = guard.remove(0);
        self.persist(&guard).await?;
        Ok(Some(ticket))
    }

    pub async fn size(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Ordered snapshot, used for inspection and dedup checks.
    pub async fn snapshot(&self) -> Vec<JobTicket> {
        self.inner.lock().await.clone()
    }

    /// Drop tickets whose predicate returns `false` (recovery queue cleanup, §4.5).
    pub async fn retain<F>(&self, mut keep: F) -> Result<usize>
    where
        F: FnMut(&JobTicket) -> bool,
    {
        let mut guard = self.inner.lock().await;
        let before = guard.len();
        guard.retain(|t| keep(t));
        let removed = before - guard.len();
        if removed > 0 {
            self.persist(&guard).await?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fifo_order_is_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let queue = JobQueue::load(dir.path().join("queue.json")).await.unwrap();

        queue.add(JobTicket::new("w1", "a")).await.unwrap();
        queue.add(JobTicket::new("w1", "b")).await.unwrap();

        assert_eq!(queue.next().await.unwrap().unwrap().node_id, "a");
        assert_eq!(queue.next().await.unwrap().unwrap().node_id, "b");
        assert!(queue.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn add_deduplicates_identical_tickets() {
        let dir = tempfile::tempdir().unwrap();
        let queue = JobQueue::load(dir.path().join("queue.json")).await.unwrap();

        queue.add(JobTicket::new("w1", "a")).await.unwrap();
        queue.add(JobTicket::new("w1", "a")).await.unwrap();

        assert_eq!(queue.size().await, 1);
    }

    #[tokio::test]
    async fn survives_reload_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");

        let queue = JobQueue::load(&path).await.unwrap();
        queue.add(JobTicket::new("w1", "a")).await.unwrap();
        drop(queue);

        let reloaded = JobQueue::load(&path).await.unwrap();
        assert_eq!(reloaded.size().await, 1);
        assert_eq!(reloaded.next().await.unwrap().unwrap().node_id, "a");
    }

    #[tokio::test]
    async fn redelivery_past_limit_drops_ticket() {
        let dir = tempfile::tempdir().unwrap();
        let queue = JobQueue::load(dir.path().join("queue.json"))
            .await
            .unwrap()
            .with_redelivery_limit(2);

        let mut ticket = JobTicket::new("w1", "a");
        ticket.redeliveries = 2;
        queue.requeue_deferred(ticket).await.unwrap();

        assert_eq!(queue.size().await, 0);
    }
}
