//! The in-memory collection of tasks owned by the sync controller.
//!
//! Every operation is total: an unknown id is a silent no-op and reports
//! that nothing changed, so intents racing with a delete are harmless.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{SubTask, SubTaskExt, Task};

/// Ordered task collection, newest first.
///
/// Invariants kept by every method:
/// - task ids are unique, and subtask ids are unique within their parent;
/// - every subtask's `parent_id` equals its containing task's id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskTree {
    tasks: Vec<Task>,
}

/// A broken tree invariant, reported by [`TaskTree::integrity_violations`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityViolation {
    DuplicateTask(Uuid),
    DuplicateSubTask { parent_id: Uuid, subtask_id: Uuid },
    OrphanedSubTask { task_id: Uuid, subtask_id: Uuid, parent_id: Uuid },
}

impl TaskTree {
    /// Wrap tasks loaded from a store. Order is kept as given.
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn into_tasks(self) -> Vec<Task> {
        self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    fn get_mut(&mut self, id: Uuid) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    pub fn position(&self, id: Uuid) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == id)
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    pub fn pending(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| !t.completed)
    }

    pub fn completed(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| t.completed)
    }

    /// Story points still to be earned (pending tasks only).
    pub fn total_story_points(&self) -> u64 {
        self.pending().map(|t| u64::from(t.story_points)).sum()
    }

    // -----------------------------------------------------------------------
    // Task operations
    // -----------------------------------------------------------------------

    /// Prepend a new pending task marked `is_new`.
    ///
    /// Returns `None` (and changes nothing) if `id` is already taken.
    pub fn add_task(&mut self, id: Uuid, description: &str, now: DateTime<Utc>) -> Option<&Task> {
        if self.get(id).is_some() {
            return None;
        }
        let mut task = Task::new(id, description, now);
        task.is_new = true;
        self.tasks.insert(0, task);
        self.tasks.first()
    }

    /// Prepend several tasks at once, keeping their relative order.
    ///
    /// Each is marked `is_new` and its subtasks are re-parented. Tasks whose
    /// id is already present are skipped. Returns how many were inserted.
    pub fn insert_front(&mut self, tasks: Vec<Task>) -> usize {
        let mut seen: HashSet<Uuid> = self.tasks.iter().map(|t| t.id).collect();
        let fresh: Vec<Task> = tasks
            .into_iter()
            .filter(|t| seen.insert(t.id))
            .map(|mut t| {
                t.is_new = true;
                let id = t.id;
                for sub in &mut t.subtasks {
                    sub.parent_id = id;
                }
                t
            })
            .collect();
        let count = fresh.len();
        self.tasks.splice(0..0, fresh);
        count
    }

    /// Flip `completed`. Returns the new value.
    pub fn toggle_complete(&mut self, id: Uuid) -> Option<bool> {
        let task = self.get_mut(id)?;
        task.completed = !task.completed;
        Some(task.completed)
    }

    /// Set story points. Negative or out-of-range values leave the task
    /// unchanged and return `false`.
    pub fn set_story_points(&mut self, id: Uuid, points: i64) -> bool {
        let Ok(points) = u32::try_from(points) else {
            return false;
        };
        match self.get_mut(id) {
            Some(task) => {
                task.story_points = points;
                true
            }
            None => false,
        }
    }

    /// Remove a task and its subtasks. Returns its former index and value.
    pub fn delete_task(&mut self, id: Uuid) -> Option<(usize, Task)> {
        let index = self.position(id)?;
        Some((index, self.tasks.remove(index)))
    }

    /// Remove every completed task. Returns the removed tasks in order.
    pub fn delete_completed(&mut self) -> Vec<Task> {
        let (done, kept): (Vec<Task>, Vec<Task>) =
            std::mem::take(&mut self.tasks).into_iter().partition(|t| t.completed);
        self.tasks = kept;
        done
    }

    /// Clear `is_new` on the given tasks. Idempotent; unknown ids are ignored.
    pub fn clear_new_flag(&mut self, ids: &[Uuid]) {
        for task in self.tasks.iter_mut().filter(|t| ids.contains(&t.id)) {
            task.is_new = false;
        }
    }

    // -----------------------------------------------------------------------
    // Subtask operations
    // -----------------------------------------------------------------------

    /// Append a pending subtask to `parent_id`.
    pub fn add_subtask(
        &mut self,
        parent_id: Uuid,
        subtask_id: Uuid,
        description: &str,
        now: DateTime<Utc>,
    ) -> Option<&SubTask> {
        let parent = self.get_mut(parent_id)?;
        if parent.subtasks.iter().any(|s| s.id == subtask_id) {
            return None;
        }
        parent
            .subtasks
            .push(SubTask::pending(subtask_id, parent_id, description.to_owned(), now));
        parent.subtasks.last()
    }

    /// Flip a subtask's `completed`. Returns the new value.
    pub fn toggle_subtask_complete(&mut self, parent_id: Uuid, subtask_id: Uuid) -> Option<bool> {
        let sub = self
            .get_mut(parent_id)?
            .subtasks
            .iter_mut()
            .find(|s| s.id == subtask_id)?;
        sub.completed = !sub.completed;
        Some(sub.completed)
    }

    /// Remove a subtask. Returns the removed value.
    pub fn delete_subtask(&mut self, parent_id: Uuid, subtask_id: Uuid) -> Option<SubTask> {
        let parent = self.get_mut(parent_id)?;
        let index = parent.subtasks.iter().position(|s| s.id == subtask_id)?;
        Some(parent.subtasks.remove(index))
    }

    // -----------------------------------------------------------------------
    // Reconciliation
    // -----------------------------------------------------------------------

    /// Replace the task stored under `placeholder` with the store's copy.
    ///
    /// The tree keeps the placeholder's position and `is_new` flag. Subtasks
    /// are re-parented to the stored id.
    pub fn confirm(&mut self, placeholder: Uuid, stored: Task) -> bool {
        if stored.id != placeholder && self.get(stored.id).is_some() {
            return false;
        }
        let Some(slot) = self.get_mut(placeholder) else {
            return false;
        };
        let is_new = slot.is_new;
        *slot = stored;
        slot.is_new = is_new;
        let id = slot.id;
        for sub in &mut slot.subtasks {
            sub.parent_id = id;
        }
        true
    }

    /// Put a task snapshot back in place of the current entry with the same id.
    pub fn restore(&mut self, snapshot: Task) -> bool {
        match self.get_mut(snapshot.id) {
            Some(slot) => {
                *slot = snapshot;
                true
            }
            None => false,
        }
    }

    /// Reinsert a deleted task at its former index (clamped to the end).
    pub fn reinsert(&mut self, index: usize, task: Task) -> bool {
        if self.get(task.id).is_some() {
            return false;
        }
        let index = index.min(self.tasks.len());
        self.tasks.insert(index, task);
        true
    }

    /// Drop the given tasks. Used to undo an optimistic insert.
    pub fn remove_ids(&mut self, ids: &[Uuid]) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|t| !ids.contains(&t.id));
        before - self.tasks.len()
    }

    // -----------------------------------------------------------------------
    // Diagnostics
    // -----------------------------------------------------------------------

    /// Every violated invariant. Empty for a healthy tree.
    pub fn integrity_violations(&self) -> Vec<IntegrityViolation> {
        let mut violations = Vec::new();
        let mut task_ids = HashSet::new();
        for task in &self.tasks {
            if !task_ids.insert(task.id) {
                violations.push(IntegrityViolation::DuplicateTask(task.id));
            }
            let mut sub_ids = HashSet::new();
            for sub in &task.subtasks {
                if !sub_ids.insert(sub.id) {
                    violations.push(IntegrityViolation::DuplicateSubTask {
                        parent_id: task.id,
                        subtask_id: sub.id,
                    });
                }
                if sub.parent_id != task.id {
                    violations.push(IntegrityViolation::OrphanedSubTask {
                        task_id: task.id,
                        subtask_id: sub.id,
                        parent_id: sub.parent_id,
                    });
                }
            }
        }
        violations
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
