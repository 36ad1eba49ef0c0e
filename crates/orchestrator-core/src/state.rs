// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! Durable per-workflow state store (§4.1).
//!
//! One directory per workflow, one `state.json` document inside, written
//! atomically via write-to-temp-then-rename so readers never observe a
//! partial document.

use crate::error::{CoreError, Result};
use crate::model::Workflow;
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Storage contract for workflow documents.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn exists(&self, workflow_id: &str) -> Result<bool>;
    async fn get(&self, workflow_id: &str) -> Result<Workflow>;
    async fn write(&self, workflow: &mut Workflow) -> Result<()>;
    async fn list(&self) -> Result<Vec<Workflow>>;
}

/// File-backed `StateStore` rooted at `<workflows_dir>/<workflow_id>/state.json`.
///
/// Writers for the same workflow id are serialized by an in-process lock
/// (§5); this is a defense-in-depth measure alongside the single-worker
/// model and the atomic rename itself.
pub struct FileStateStore {
    root: PathBuf,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl FileStateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: DashMap::new(),
        }
    }

    fn workflow_dir(&self, workflow_id: &str) -> PathBuf {
        self.root.join(workflow_id)
    }

    fn state_path(&self, workflow_id: &str) -> PathBuf {
        self.workflow_dir(workflow_id).join("state.json")
    }

    fn lock_for(&self, workflow_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(workflow_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn exists(&self, workflow_id: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.state_path(workflow_id)).await?)
    }

    async fn get(&self, workflow_id: &str) -> Result<Workflow> {
        let path = self.state_path(workflow_id);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|_| CoreError::WorkflowNotFound(workflow_id.to_string()))?;
        let workflow: Workflow = serde_json::from_slice(&bytes)?;
        Ok(workflow)
    }

    async fn write(&self, workflow: &mut Workflow) -> Result<()> {
        let lock = self.lock_for(&workflow.id);
        let _guard = lock.lock().await;

        workflow.updated_at = chrono::Utc::now();

        let dir = self.workflow_dir(&workflow.id);
        tokio::fs::create_dir_all(&dir).await?;

        let final_path = dir.join("state.json");
        let tmp_path = dir.join(format!(".state.json.{}.tmp", uuid::Uuid::new_v4()));

        let bytes = serde_json::to_vec_pretty(workflow)?;
        tokio::fs::write(&tmp_path, &bytes).await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<Workflow>> {
        let mut workflows = Vec::new();

        if !tokio::fs::try_exists(&self.root).await? {
            return Ok(workflows);
        }

        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let workflow_id = entry.file_name().to_string_lossy().into_owned();
            match self.get(&workflow_id).await {
                Ok(workflow) => workflows.push(workflow),
                Err(err) => {
                    tracing::warn!(%workflow_id, error = %err, "failed to load workflow, skipping");
                }
            }
        }

        workflows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(workflows)
    }
}

/// Convenience for tests and CLI wiring: ensure the root directory exists.
pub async fn ensure_root(root: &Path) -> Result<()> {
    tokio::fs::create_dir_all(root).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Step, Workflow};

    #[tokio::test]
    async fn write_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path());

        let mut wf = Workflow::new("w1", "test", vec![Step::new("a", "A", "sim")]);
        store.write(&mut wf).await.unwrap();

        assert!(store.exists("w1").await.unwrap());
        let loaded = store.get("w1").await.unwrap();
        assert_eq!(loaded.id, "w1");
        assert_eq!(loaded.steps.len(), 1);
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path());
        let err = store.get("nope").await.unwrap_err();
        assert!(matches!(err, CoreError::WorkflowNotFound(_)));
    }

    #[tokio::test]
    async fn list_sorts_by_updated_at_desc() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path());

        let mut wf1 = Workflow::new("w1", "first", vec![]);
        store.write(&mut wf1).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let mut wf2 = Workflow::new("w2", "second", vec![]);
        store.write(&mut wf2).await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed[0].id, "w2");
        assert_eq!(listed[1].id, "w1");
    }

    #[tokio::test]
    async fn preserves_unrecognized_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path());

        let path = dir.path().join("w1");
        tokio::fs::create_dir_all(&path).await.unwrap();
        tokio::fs::write(
            path.join("state.json"),
            r#"{
                "id": "w1",
                "name": "n",
                "status": "PENDING",
                "steps": [],
                "createdAt": "2024-01-01T00:00:00Z",
                "updatedAt": "2024-01-01T00:00:00Z",
                "futureField": "keep-me"
            }"#,
        )
        .await
        .unwrap();

        let mut wf = store.get("w1").await.unwrap();
        assert_eq!(
            wf.extra.get("futureField").unwrap().as_str(),
            Some("keep-me")
        );
        store.write(&mut wf).await.unwrap();

        let raw = tokio::fs::read_to_string(path.join("state.json"))
            .await
            .unwrap();
        assert!(raw.contains("futureField"));
    }
}
