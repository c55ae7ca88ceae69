//! Ordering of concurrent intents.
//!
//! Intents on one task run one at a time, in arrival order. Intents on
//! different tasks run concurrently. Bulk operations take the gate
//! exclusively and so wait for every in-flight per-task intent, and block
//! new ones until they finish.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::{Mutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use uuid::Uuid;

#[derive(Debug, Default)]
pub(crate) struct TaskLocks {
    gate: Arc<RwLock<()>>,
    per_task: StdMutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

/// Held for the duration of a per-task intent.
pub(crate) struct TaskGuard {
    _task: OwnedMutexGuard<()>,
    _gate: OwnedRwLockReadGuard<()>,
}

impl TaskLocks {
    /// Serialize with other intents on `id`.
    pub(crate) async fn task(&self, id: Uuid) -> TaskGuard {
        let gate = Arc::clone(&self.gate).read_owned().await;
        let lock = {
            let mut map = self.per_task.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(map.entry(id).or_default())
        };
        TaskGuard {
            _task: lock.lock_owned().await,
            _gate: gate,
        }
    }

    /// Exclude every per-task intent.
    pub(crate) async fn exclusive(&self) -> OwnedRwLockWriteGuard<()> {
        Arc::clone(&self.gate).write_owned().await
    }

    /// Drop the lock entry of a task that no longer exists.
    pub(crate) fn forget(&self, id: Uuid) {
        self.per_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}
