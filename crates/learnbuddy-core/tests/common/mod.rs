//! Test doubles for the sync layer: an in-memory store with failure
//! injection and a generation backend that replays scripted replies.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use learnbuddy_core::generate::{GenerationBackend, GenerationRequest, StructuredGenerator};
use learnbuddy_core::{
    Identity, NewTask, Notice, StoreError, SyncConfig, SyncController, Task, TaskPatch, TaskStore,
};

// ---------------------------------------------------------------------------
// FakeStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    List,
    Create,
    Update,
    Delete,
    BulkDelete,
    BulkCreate,
}

#[derive(Default)]
struct FakeState {
    tasks: Vec<Task>,
    failing: HashSet<Op>,
    calls: Vec<Op>,
    updates: Vec<TaskPatch>,
    update_delay: Option<Duration>,
    short_bulk_create: bool,
}

/// In-memory [`TaskStore`]. Optionally assigns its own ids on create, like
/// the remote backend does.
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<FakeState>,
    assign_ids: bool,
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn assigning_ids() -> Arc<Self> {
        Arc::new(Self {
            assign_ids: true,
            ..Self::default()
        })
    }

    /// Make every call of `op` fail until [`FakeStore::heal`].
    pub fn fail(&self, op: Op) {
        self.state.lock().unwrap().failing.insert(op);
    }

    /// Hold every `update_task` call for `delay` before it touches state.
    pub fn suspend_updates(&self, delay: Duration) {
        self.state.lock().unwrap().update_delay = Some(delay);
    }

    /// Make `bulk_create` store every row but return one row short.
    pub fn drop_last_bulk_row(&self) {
        self.state.lock().unwrap().short_bulk_create = true;
    }

    /// Patches that reached `update_task`, in arrival order.
    pub fn updates(&self) -> Vec<TaskPatch> {
        self.state.lock().unwrap().updates.clone()
    }

    pub fn heal(&self) {
        self.state.lock().unwrap().failing.clear();
    }

    pub fn seed(&self, tasks: Vec<Task>) {
        self.state.lock().unwrap().tasks = tasks;
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.state.lock().unwrap().tasks.clone()
    }

    pub fn get(&self, id: Uuid) -> Option<Task> {
        self.tasks().into_iter().find(|t| t.id == id)
    }

    pub fn calls(&self, op: Op) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| **c == op)
            .count()
    }

    fn enter(&self, op: Op) -> Result<std::sync::MutexGuard<'_, FakeState>, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(op);
        if state.failing.contains(&op) {
            return Err(StoreError::Backend(anyhow!("injected {op:?} failure")));
        }
        Ok(state)
    }

    fn stored(&self, data: NewTask) -> Task {
        let mut data = data;
        if self.assign_ids {
            data.client_id = Uuid::new_v4();
        }
        data.into_task()
    }
}

#[async_trait]
impl TaskStore for FakeStore {
    fn name(&self) -> &str {
        "fake"
    }

    async fn list_tasks(&self, _owner: &Identity) -> Result<Vec<Task>, StoreError> {
        let state = self.enter(Op::List)?;
        let mut tasks = state.tasks.clone();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }

    async fn create_task(&self, _owner: &Identity, data: NewTask) -> Result<Task, StoreError> {
        let task = self.stored(data);
        let mut state = self.enter(Op::Create)?;
        state.tasks.insert(0, task.clone());
        Ok(task)
    }

    async fn update_task(
        &self,
        _owner: &Identity,
        id: Uuid,
        patch: TaskPatch,
    ) -> Result<(), StoreError> {
        let delay = self.state.lock().unwrap().update_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.enter(Op::Update)?;
        state.updates.push(patch.clone());
        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(StoreError::NotFound(id))?;
        patch.apply(task);
        Ok(())
    }

    async fn delete_task(&self, _owner: &Identity, id: Uuid) -> Result<(), StoreError> {
        let mut state = self.enter(Op::Delete)?;
        let index = state
            .tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or(StoreError::NotFound(id))?;
        state.tasks.remove(index);
        Ok(())
    }

    async fn bulk_delete_completed(&self, _owner: &Identity) -> Result<u64, StoreError> {
        let mut state = self.enter(Op::BulkDelete)?;
        let before = state.tasks.len();
        state.tasks.retain(|t| !t.completed);
        Ok((before - state.tasks.len()) as u64)
    }

    async fn bulk_create(
        &self,
        _owner: &Identity,
        data: Vec<NewTask>,
    ) -> Result<Vec<Task>, StoreError> {
        let created: Vec<Task> = data.into_iter().map(|d| self.stored(d)).collect();
        let mut state = self.enter(Op::BulkCreate)?;
        state.tasks.splice(0..0, created.iter().cloned());
        let mut created = created;
        if state.short_bulk_create {
            created.pop();
        }
        Ok(created)
    }
}

// ---------------------------------------------------------------------------
// ScriptedBackend
// ---------------------------------------------------------------------------

/// Replays queued replies in order. An exhausted script is an error.
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<anyhow::Result<Option<Value>>>>,
    requests: Mutex<Vec<GenerationRequest>>,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, value: Value) {
        self.replies.lock().unwrap().push_back(Ok(Some(value)));
    }

    pub fn reply_nothing(&self) {
        self.replies.lock().unwrap().push_back(Ok(None));
    }

    pub fn fail(&self, message: &str) {
        self.replies.lock().unwrap().push_back(Err(anyhow!(message.to_owned())));
    }

    /// Hold every request for `delay` before replying.
    pub fn suspend(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<Option<Value>> {
        self.requests.lock().unwrap().push(request.clone());
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("no scripted reply left")))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub controller: Arc<SyncController>,
    pub store: Arc<FakeStore>,
    pub backend: Arc<ScriptedBackend>,
    pub notices: broadcast::Receiver<Notice>,
}

impl Harness {
    pub fn new(store: Arc<FakeStore>) -> Self {
        let backend = ScriptedBackend::new();
        let controller = SyncController::new(
            Identity::new("alice").unwrap(),
            store.clone(),
            StructuredGenerator::new(backend.clone()),
            SyncConfig::default(),
        );
        let notices = controller.subscribe();
        Self {
            controller: Arc::new(controller),
            store,
            backend,
            notices,
        }
    }

    /// Every notice published so far.
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        let mut out = Vec::new();
        while let Ok(n) = self.notices.try_recv() {
            out.push(n);
        }
        out
    }
}
