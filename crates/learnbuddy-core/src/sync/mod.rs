//! Reconciliation/Sync Controller.
//!
//! Every intent follows the same protocol:
//!
//! 1. validate input locally ([`ValidationError`] short-circuits here);
//! 2. snapshot the affected task(s) and apply the change to the tree;
//! 3. send the matching operation to the [`TaskStore`];
//! 4. on success, reconcile (placeholder id to stored id) and schedule the
//!    `is_new` timer; on failure, restore the snapshot and publish one
//!    error notice.
//!
//! The identity is fixed at construction. A new identity means a new
//! controller (see [`crate::session::Session`]).

mod locks;
mod notice;
mod timers;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{GenerationError, StoreError, SyncError, ValidationError};
use crate::generate::{EffortEstimate, Pathway, StructuredGenerator};
use crate::identity::Identity;
use crate::model::{
    NewTask, SubTask, SubTaskExt, Task, TaskPatch, TaskTree, normalize_description,
    normalize_learning_goal, parse_story_points, validate_story_points,
};
use crate::store::TaskStore;

use locks::TaskLocks;
pub use notice::{Notice, NoticeLevel};
use timers::NewFlagTimers;

/// Default time a task keeps its `is_new` marker after confirmation.
pub const DEFAULT_NEW_FLAG_DELAY: Duration = Duration::from_millis(600);

const NOTICE_CAPACITY: usize = 64;

/// Tunables for a [`SyncController`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub new_flag_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            new_flag_delay: DEFAULT_NEW_FLAG_DELAY,
        }
    }
}

/// A fresh notice channel. Keep the sender to share it across controllers.
pub fn notice_channel() -> broadcast::Sender<Notice> {
    broadcast::channel(NOTICE_CAPACITY).0
}

/// Owns the task tree for one identity and keeps it in step with a store.
pub struct SyncController {
    owner: Identity,
    store: Arc<dyn TaskStore>,
    generator: StructuredGenerator,
    tree: Arc<Mutex<TaskTree>>,
    locks: TaskLocks,
    timers: NewFlagTimers,
    notices: broadcast::Sender<Notice>,
    config: SyncConfig,
}

impl fmt::Debug for SyncController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncController")
            .field("owner", &self.owner)
            .field("store", &self.store.name())
            .field("generator", &self.generator)
            .field("config", &self.config)
            .finish()
    }
}

impl SyncController {
    pub fn new(
        owner: Identity,
        store: Arc<dyn TaskStore>,
        generator: StructuredGenerator,
        config: SyncConfig,
    ) -> Self {
        Self {
            owner,
            store,
            generator,
            tree: Arc::new(Mutex::new(TaskTree::default())),
            locks: TaskLocks::default(),
            timers: NewFlagTimers::default(),
            notices: notice_channel(),
            config,
        }
    }

    /// Publish notices on an existing channel instead of a private one.
    pub fn with_notices(mut self, notices: broadcast::Sender<Notice>) -> Self {
        self.notices = notices;
        self
    }

    pub fn owner(&self) -> &Identity {
        &self.owner
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// A copy of the current tree.
    pub async fn snapshot(&self) -> TaskTree {
        self.tree.lock().await.clone()
    }

    /// A copy of the current tasks, newest first.
    pub async fn tasks(&self) -> Vec<Task> {
        self.tree.lock().await.tasks().to_vec()
    }

    /// Retire this controller: pending `is_new` timers are cancelled and no
    /// new ones start. Used when the identity changes.
    pub fn shutdown(&self) {
        self.timers.cancel_all();
    }

    /// Number of `is_new` timers still waiting to fire.
    pub fn pending_new_flags(&self) -> usize {
        self.timers.pending_count()
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Replace the tree with the store's contents. On failure the tree is
    /// left empty.
    pub async fn load(&self) -> Result<usize, SyncError> {
        let _gate = self.locks.exclusive().await;
        match self.store.list_tasks(&self.owner).await {
            Ok(tasks) => {
                let count = tasks.len();
                *self.tree.lock().await = TaskTree::new(tasks);
                info!(owner = %self.owner, store = self.store.name(), count, "loaded tasks");
                Ok(count)
            }
            Err(err) => {
                *self.tree.lock().await = TaskTree::default();
                self.report("Could not fetch tasks", &err);
                Err(err.into())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Task intents
    // -----------------------------------------------------------------------

    /// Add a task at the top of the list.
    pub async fn add_task(&self, description: &str) -> Result<Task, SyncError> {
        let description = normalize_description(description).map_err(|e| self.reject(e))?;
        let placeholder = Uuid::new_v4();
        let _guard = self.locks.task(placeholder).await;

        let data = {
            let mut tree = self.tree.lock().await;
            let Some(task) = tree.add_task(placeholder, &description, Utc::now()) else {
                let err = anyhow::anyhow!("duplicate task id {placeholder}");
                return Err(StoreError::Backend(err).into());
            };
            NewTask::from_task(task)
        };
        debug!(task_id = %placeholder, "optimistic add");

        match self.store.create_task(&self.owner, data).await {
            Ok(stored) => {
                let id = stored.id;
                let task = {
                    let mut tree = self.tree.lock().await;
                    tree.confirm(placeholder, stored.clone());
                    tree.get(id).cloned().unwrap_or(stored)
                };
                if id != placeholder {
                    self.locks.forget(placeholder);
                }
                self.schedule_new_flag(vec![id]);
                self.notify(Notice::success(
                    "Task added",
                    format!("\"{}\" was added.", task.description),
                ));
                Ok(task)
            }
            Err(err) => {
                self.tree.lock().await.remove_ids(&[placeholder]);
                self.locks.forget(placeholder);
                self.report("Could not add task", &err);
                Err(err.into())
            }
        }
    }

    /// Flip a task's completion. `Ok(None)` if the task is not in the tree.
    pub async fn toggle_complete(&self, id: Uuid) -> Result<Option<bool>, SyncError> {
        self.mutate_task(id, "Could not update task", |tree| {
            let completed = tree.toggle_complete(id)?;
            Some((completed, TaskPatch::completed(completed)))
        })
        .await
    }

    /// Set story points from a number. Negative values are rejected before
    /// anything changes.
    pub async fn set_story_points(&self, id: Uuid, points: i64) -> Result<bool, SyncError> {
        let points = validate_story_points(points).map_err(|e| self.reject(e))?;
        self.apply_story_points(id, points).await
    }

    /// Set story points from user-entered text.
    pub async fn set_story_points_input(&self, id: Uuid, raw: &str) -> Result<bool, SyncError> {
        let points = parse_story_points(raw).map_err(|e| self.reject(e))?;
        self.apply_story_points(id, points).await
    }

    async fn apply_story_points(&self, id: Uuid, points: u32) -> Result<bool, SyncError> {
        let applied = self
            .mutate_task(id, "Could not update story points", |tree| {
                tree.set_story_points(id, i64::from(points))
                    .then(|| ((), TaskPatch::story_points(points)))
            })
            .await?;
        Ok(applied.is_some())
    }

    /// Delete a task with its subtasks. `Ok(false)` if it was not there.
    pub async fn delete_task(&self, id: Uuid) -> Result<bool, SyncError> {
        let _guard = self.locks.task(id).await;
        let Some((index, removed)) = self.tree.lock().await.delete_task(id) else {
            return Ok(false);
        };
        self.timers.cancel(id);
        debug!(task_id = %id, "optimistic delete");

        match self.store.delete_task(&self.owner, id).await {
            Ok(()) => {
                self.locks.forget(id);
                self.notify(Notice::success(
                    "Task deleted",
                    format!("\"{}\" was removed.", removed.description),
                ));
                Ok(true)
            }
            Err(err) => {
                let is_new = removed.is_new;
                self.tree.lock().await.reinsert(index, removed);
                if is_new {
                    self.schedule_new_flag(vec![id]);
                }
                self.report("Could not delete task", &err);
                Err(err.into())
            }
        }
    }

    /// Delete every completed task in one store call.
    pub async fn delete_all_completed(&self) -> Result<u64, SyncError> {
        let _gate = self.locks.exclusive().await;
        let (before, removed) = {
            let mut tree = self.tree.lock().await;
            let before = tree.clone();
            let removed = tree.delete_completed();
            (before, removed)
        };
        for task in &removed {
            self.timers.cancel(task.id);
        }

        match self.store.bulk_delete_completed(&self.owner).await {
            Ok(0) => {
                self.notify(Notice::info("Nothing to clear", "No completed tasks to delete."));
                Ok(0)
            }
            Ok(count) => {
                for task in &removed {
                    self.locks.forget(task.id);
                }
                info!(owner = %self.owner, count, "deleted completed tasks");
                self.notify(Notice::success(
                    "Completed tasks cleared",
                    format!("{count} completed task(s) deleted."),
                ));
                Ok(count)
            }
            Err(err) => {
                self.restore_tree(before).await;
                self.report("Could not delete completed tasks", &err);
                Err(err.into())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Subtask intents
    // -----------------------------------------------------------------------

    /// Append a subtask. `Ok(None)` if the parent is not in the tree.
    pub async fn add_subtask(
        &self,
        parent_id: Uuid,
        description: &str,
    ) -> Result<Option<SubTask>, SyncError> {
        let description = normalize_description(description).map_err(|e| self.reject(e))?;
        let subtask_id = Uuid::new_v4();
        self.mutate_task(parent_id, "Could not add subtask", |tree| {
            let sub = tree
                .add_subtask(parent_id, subtask_id, &description, Utc::now())?
                .clone();
            let subtasks = tree.get(parent_id)?.subtasks.clone();
            Some((sub, TaskPatch::subtasks(subtasks)))
        })
        .await
    }

    pub async fn toggle_subtask_complete(
        &self,
        parent_id: Uuid,
        subtask_id: Uuid,
    ) -> Result<Option<bool>, SyncError> {
        self.mutate_task(parent_id, "Could not update subtask", |tree| {
            let completed = tree.toggle_subtask_complete(parent_id, subtask_id)?;
            let subtasks = tree.get(parent_id)?.subtasks.clone();
            Some((completed, TaskPatch::subtasks(subtasks)))
        })
        .await
    }

    pub async fn delete_subtask(
        &self,
        parent_id: Uuid,
        subtask_id: Uuid,
    ) -> Result<bool, SyncError> {
        let deleted = self
            .mutate_task(parent_id, "Could not delete subtask", |tree| {
                tree.delete_subtask(parent_id, subtask_id)?;
                let subtasks = tree.get(parent_id)?.subtasks.clone();
                Some(((), TaskPatch::subtasks(subtasks)))
            })
            .await?;
        Ok(deleted.is_some())
    }

    // -----------------------------------------------------------------------
    // Generation intents
    // -----------------------------------------------------------------------

    /// Ask the generator for an estimate and apply it as story points.
    /// `Ok(None)` if the task is not in the tree, before or after generation.
    pub async fn estimate_effort(&self, id: Uuid) -> Result<Option<EffortEstimate>, SyncError> {
        let description = self.tree.lock().await.get(id).map(|t| t.description.clone());
        let Some(description) = description else {
            return Ok(None);
        };

        let estimate = self
            .generator
            .estimate_effort(&description)
            .await
            .map_err(|e| self.generation_failed("Failed to estimate effort", e))?;

        // The task may have been deleted while the generator was running.
        if !self.apply_story_points(id, estimate.story_points).await? {
            return Ok(None);
        }
        self.notify(Notice::success(
            "Effort estimated",
            format!(
                "Suggested {} story points. Justification: {}",
                estimate.story_points, estimate.justification
            ),
        ));
        Ok(Some(estimate))
    }

    /// Ask for advice on organizing the current tasks. Never changes the tree.
    pub async fn suggest_organization(&self) -> Result<String, SyncError> {
        let descriptions: Vec<String> = self
            .tree
            .lock()
            .await
            .tasks()
            .iter()
            .map(|t| t.description.clone())
            .collect();
        if descriptions.is_empty() {
            return Err(self.reject(ValidationError::NoTasks));
        }

        let suggestion = self
            .generator
            .suggest_organization(descriptions)
            .await
            .map_err(|e| self.generation_failed("Failed to get suggestions", e))?;
        self.notify(Notice::success("Suggestions ready", suggestion.clone()));
        Ok(suggestion)
    }

    /// Generate a pathway for `goal`. Never changes the tree; pass the
    /// result to [`SyncController::add_pathway`] to keep it.
    pub async fn generate_pathway(&self, goal: &str) -> Result<Pathway, SyncError> {
        let goal = normalize_learning_goal(goal).map_err(|e| self.reject(e))?;
        let pathway = self
            .generator
            .generate_pathway(&goal)
            .await
            .map_err(|e| self.generation_failed("Failed to generate pathway", e))?;
        if pathway.steps.is_empty() {
            self.notify(Notice::info("Empty pathway", "The generated pathway has no steps."));
        } else {
            self.notify(Notice::success(
                "Pathway generated",
                format!("\"{}\" with {} step(s).", pathway.title, pathway.steps.len()),
            ));
        }
        Ok(pathway)
    }

    /// Insert every pathway step as a task, atomically.
    ///
    /// Steps are placed at the top in pathway order, with `created_at`
    /// decreasing by one microsecond per step so newest-first listings keep
    /// that order. A store failure, or a row count that does not match the
    /// steps, removes all of them.
    pub async fn add_pathway(&self, pathway: &Pathway) -> Result<Vec<Task>, SyncError> {
        if pathway.steps.is_empty() {
            self.notify(Notice::info("Nothing to add", "The pathway has no steps."));
            return Ok(Vec::new());
        }

        let _gate = self.locks.exclusive().await;
        let now = Utc::now();
        let drafts: Vec<Task> = pathway
            .steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                let created_at = now - chrono::Duration::microseconds(i as i64);
                let mut task = Task::new(Uuid::new_v4(), step.description.clone(), created_at);
                task.subtasks = step
                    .subtasks
                    .iter()
                    .map(|d| SubTask::pending(Uuid::new_v4(), task.id, d.clone(), created_at))
                    .collect();
                task
            })
            .collect();
        let data: Vec<NewTask> = drafts.iter().map(NewTask::from_task).collect();

        let before = {
            let mut tree = self.tree.lock().await;
            let before = tree.clone();
            tree.insert_front(drafts.clone());
            before
        };
        debug!(count = drafts.len(), "optimistic pathway insert");

        let created = self.store.bulk_create(&self.owner, data).await.and_then(|stored| {
            if stored.len() == drafts.len() {
                Ok(stored)
            } else {
                Err(StoreError::Backend(anyhow::anyhow!(
                    "store created {} of {} pathway tasks",
                    stored.len(),
                    drafts.len()
                )))
            }
        });
        match created {
            Ok(stored) => {
                let added = {
                    let mut tree = self.tree.lock().await;
                    drafts
                        .iter()
                        .zip(stored)
                        .filter_map(|(draft, stored)| {
                            let id = stored.id;
                            tree.confirm(draft.id, stored);
                            tree.get(id).cloned()
                        })
                        .collect::<Vec<Task>>()
                };
                self.schedule_new_flag(added.iter().map(|t| t.id).collect());
                info!(owner = %self.owner, count = added.len(), "added pathway tasks");
                self.notify(Notice::success(
                    "Pathway added",
                    format!("{} task(s) from \"{}\" were added.", added.len(), pathway.title),
                ));
                Ok(added)
            }
            Err(err) => {
                self.restore_tree(before).await;
                self.report("Could not add pathway", &err);
                Err(err.into())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Per-task intent skeleton: snapshot, apply, persist, roll back.
    ///
    /// `apply` returns `None` when the tree did not change; the store is
    /// then not called.
    async fn mutate_task<T>(
        &self,
        id: Uuid,
        failure_title: &str,
        apply: impl FnOnce(&mut TaskTree) -> Option<(T, TaskPatch)>,
    ) -> Result<Option<T>, SyncError> {
        let _guard = self.locks.task(id).await;
        let (snapshot, out, patch) = {
            let mut tree = self.tree.lock().await;
            let Some(snapshot) = tree.get(id).cloned() else {
                return Ok(None);
            };
            let Some((out, patch)) = apply(&mut *tree) else {
                return Ok(None);
            };
            (snapshot, out, patch)
        };
        debug!(task_id = %id, "optimistic update");

        match self.store.update_task(&self.owner, id, patch).await {
            Ok(()) => Ok(Some(out)),
            Err(err) => {
                // The timer may have fired while the store call was pending.
                let was_new = snapshot.is_new;
                self.tree.lock().await.restore(snapshot);
                if was_new {
                    self.schedule_new_flag(vec![id]);
                }
                self.report(failure_title, &err);
                Err(err.into())
            }
        }
    }

    /// Put a whole-tree snapshot back after a failed bulk operation.
    async fn restore_tree(&self, before: TaskTree) {
        let still_new: Vec<Uuid> = before
            .tasks()
            .iter()
            .filter(|t| t.is_new)
            .map(|t| t.id)
            .collect();
        *self.tree.lock().await = before;
        self.schedule_new_flag(still_new);
    }

    fn schedule_new_flag(&self, ids: Vec<Uuid>) {
        self.timers
            .schedule(ids, Arc::clone(&self.tree), self.config.new_flag_delay);
    }

    fn notify(&self, notice: Notice) {
        // No subscribers is fine.
        let _ = self.notices.send(notice);
    }

    fn report(&self, title: &str, err: &StoreError) {
        warn!(owner = %self.owner, error = %err, "{title}");
        self.notify(Notice::error(title, err.to_string()));
    }

    fn reject(&self, err: ValidationError) -> SyncError {
        let title = match err {
            ValidationError::BlankDescription => "Missing description",
            ValidationError::InvalidStoryPoints(_) => "Invalid story points",
            ValidationError::BlankLearningGoal => "No learning goal",
            ValidationError::NoTasks => "No tasks",
        };
        self.notify(Notice::info(title, err.to_string()));
        err.into()
    }

    fn generation_failed(&self, title: &str, err: GenerationError) -> SyncError {
        warn!(operation = %err.operation(), error = %err, "generation failed");
        self.notify(Notice::error(title, err.to_string()));
        err.into()
    }
}
