//! Local snapshot store: the whole collection as one JSON file.
//!
//! Every successful write replaces the file atomically (temp file plus
//! rename). The in-memory copy only advances after the write lands, so a
//! failed write leaves both disk and memory at the previous snapshot.

use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::TaskStore;
use crate::error::{LoadError, StoreError};
use crate::identity::Identity;
use crate::model::{NewTask, Task, TaskPatch};

/// File name of the snapshot inside the data directory.
pub const SNAPSHOT_FILE: &str = "learnbuddy-tasks.json";

/// Where the local snapshot lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalStoreConfig {
    pub data_dir: PathBuf,
}

impl LocalStoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(SNAPSHOT_FILE)
    }
}

/// Read a snapshot file.
///
/// A missing file is an empty collection, not an error.
pub async fn read_snapshot(path: &Path) -> Result<Vec<Task>, LoadError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(LoadError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_slice(&bytes).map_err(|source| LoadError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// Single-user store persisted to a JSON snapshot.
///
/// The owner argument of [`TaskStore`] methods is ignored: there is exactly
/// one implicit identity per data directory.
#[derive(Debug)]
pub struct LocalTaskStore {
    path: PathBuf,
    tasks: Mutex<Vec<Task>>,
}

impl LocalTaskStore {
    /// Open the snapshot in `config.data_dir`.
    ///
    /// Unreadable or malformed snapshots are logged and treated as empty;
    /// the next successful write replaces them.
    pub async fn open(config: &LocalStoreConfig) -> Self {
        let path = config.snapshot_path();
        let tasks = match read_snapshot(&path).await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(error = %e, "ignoring unreadable task snapshot");
                Vec::new()
            }
        };
        debug!(path = %path.display(), count = tasks.len(), "opened local task store");
        Self {
            path,
            tasks: Mutex::new(tasks),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, tasks: &[Task]) -> anyhow::Result<()> {
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        let json = serde_json::to_vec_pretty(tasks).context("failed to serialize tasks")?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }

    /// Run `f` on a copy of the collection, write it, then publish it.
    async fn commit<T>(
        &self,
        f: impl FnOnce(&mut Vec<Task>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut current = self.tasks.lock().await;
        let mut next = current.clone();
        let out = f(&mut next)?;
        self.persist(&next).await?;
        *current = next;
        Ok(out)
    }
}

fn find_mut(tasks: &mut [Task], id: Uuid) -> Result<&mut Task, StoreError> {
    tasks
        .iter_mut()
        .find(|t| t.id == id)
        .ok_or(StoreError::NotFound(id))
}

#[async_trait]
impl TaskStore for LocalTaskStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn list_tasks(&self, _owner: &Identity) -> Result<Vec<Task>, StoreError> {
        let mut tasks = self.tasks.lock().await.clone();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }

    async fn create_task(&self, _owner: &Identity, data: NewTask) -> Result<Task, StoreError> {
        let task = data.into_task();
        self.commit(|tasks| {
            if tasks.iter().any(|t| t.id == task.id) {
                return Err(anyhow!("task {} already exists", task.id).into());
            }
            tasks.insert(0, task.clone());
            Ok(task)
        })
        .await
    }

    async fn update_task(
        &self,
        _owner: &Identity,
        id: Uuid,
        patch: TaskPatch,
    ) -> Result<(), StoreError> {
        self.commit(|tasks| {
            patch.apply(find_mut(tasks, id)?);
            Ok(())
        })
        .await
    }

    async fn delete_task(&self, _owner: &Identity, id: Uuid) -> Result<(), StoreError> {
        self.commit(|tasks| {
            let index = tasks
                .iter()
                .position(|t| t.id == id)
                .ok_or(StoreError::NotFound(id))?;
            tasks.remove(index);
            Ok(())
        })
        .await
    }

    async fn bulk_delete_completed(&self, _owner: &Identity) -> Result<u64, StoreError> {
        self.commit(|tasks| {
            let before = tasks.len();
            tasks.retain(|t| !t.completed);
            Ok((before - tasks.len()) as u64)
        })
        .await
    }

    async fn bulk_create(
        &self,
        _owner: &Identity,
        data: Vec<NewTask>,
    ) -> Result<Vec<Task>, StoreError> {
        let created: Vec<Task> = data.into_iter().map(NewTask::into_task).collect();
        self.commit(|tasks| {
            for task in &created {
                if tasks.iter().any(|t| t.id == task.id) {
                    return Err(anyhow!("task {} already exists", task.id).into());
                }
            }
            tasks.splice(0..0, created.iter().cloned());
            Ok(created)
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
