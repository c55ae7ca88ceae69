//! Task Store Adapter: persistence behind one interface.
//!
//! Two backends implement [`TaskStore`]:
//! - [`remote::PgTaskStore`], a per-user namespace in Postgres;
//! - [`local::LocalTaskStore`], a JSON snapshot on disk for one implicit user.
//!
//! Which one is used is decided once per identity by
//! [`crate::session::BackendSelector`]; callers never branch on it.

pub mod local;
pub mod remote;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::identity::Identity;
use crate::model::{NewTask, Task, TaskPatch};

pub use local::{LocalStoreConfig, LocalTaskStore};
pub use remote::PgTaskStore;

/// Uniform persistence interface for tasks and their subtasks.
///
/// Subtasks are stored embedded in their parent, so subtask changes go
/// through [`TaskStore::update_task`] with a full replacement list.
///
/// Tasks returned by a store always have `is_new == false`.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Short backend name for logs (e.g. "postgres", "local").
    fn name(&self) -> &str;

    /// All tasks of `owner`, newest `created_at` first.
    async fn list_tasks(&self, owner: &Identity) -> Result<Vec<Task>, StoreError>;

    /// Persist a new task. The returned task carries the id that was kept
    /// or assigned, with subtasks re-parented to it.
    async fn create_task(&self, owner: &Identity, data: NewTask) -> Result<Task, StoreError>;

    /// Apply a partial update. [`StoreError::NotFound`] if the task is absent.
    async fn update_task(
        &self,
        owner: &Identity,
        id: Uuid,
        patch: TaskPatch,
    ) -> Result<(), StoreError>;

    /// Delete a task with its subtasks. [`StoreError::NotFound`] if absent.
    async fn delete_task(&self, owner: &Identity, id: Uuid) -> Result<(), StoreError>;

    /// Delete every completed task of `owner`. Returns how many went.
    async fn bulk_delete_completed(&self, owner: &Identity) -> Result<u64, StoreError>;

    /// Create several tasks in one all-or-nothing write. Output order
    /// matches input order.
    async fn bulk_create(
        &self,
        owner: &Identity,
        data: Vec<NewTask>,
    ) -> Result<Vec<Task>, StoreError>;
}

// Compile-time assertion: TaskStore must be usable as `dyn TaskStore`.
const _: () = {
    fn _assert_object_safe(_: &dyn TaskStore) {}
};
