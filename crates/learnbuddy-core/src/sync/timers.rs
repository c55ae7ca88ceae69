//! Delayed clearing of the `is_new` marker.
//!
//! Each scheduled task id holds a cancellation token until its timer fires.
//! Deleting a task cancels its token so the timer cannot touch it, and
//! dropping the timers (controller teardown) cancels everything.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::model::TaskTree;

#[derive(Debug, Default)]
pub(crate) struct NewFlagTimers {
    root: CancellationToken,
    pending: Arc<StdMutex<HashMap<Uuid, CancellationToken>>>,
}

impl NewFlagTimers {
    /// Clear `is_new` on `ids` after `delay`, unless cancelled first.
    pub(crate) fn schedule(&self, ids: Vec<Uuid>, tree: Arc<Mutex<TaskTree>>, delay: Duration) {
        if ids.is_empty() {
            return;
        }
        let entries: Vec<(Uuid, CancellationToken)> = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            ids.into_iter()
                .map(|id| {
                    let token = self.root.child_token();
                    if let Some(previous) = pending.insert(id, token.clone()) {
                        previous.cancel();
                    }
                    (id, token)
                })
                .collect()
        };
        let root = self.root.clone();
        let pending = Arc::clone(&self.pending);

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = root.cancelled() => return,
            }
            let live: Vec<Uuid> = entries
                .iter()
                .filter(|(_, token)| !token.is_cancelled())
                .map(|(id, _)| *id)
                .collect();
            if !live.is_empty() {
                tree.lock().await.clear_new_flag(&live);
                debug!(count = live.len(), "cleared new flag");
            }
            let mut map = pending.lock().unwrap_or_else(PoisonError::into_inner);
            for id in &live {
                map.remove(id);
            }
        });
    }

    /// Stop the pending timer for `id`, if any.
    pub(crate) fn cancel(&self, id: Uuid) {
        let token = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if let Some(token) = token {
            token.cancel();
        }
    }

    /// Cancel every pending timer and refuse new ones.
    pub(crate) fn cancel_all(&self) {
        self.root.cancel();
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of timers not yet fired or cancelled.
    pub(crate) fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Drop for NewFlagTimers {
    fn drop(&mut self) {
        self.root.cancel();
    }
}
