//! Task and subtask records plus the in-memory [`TaskTree`].

mod input;
mod tree;

pub use input::{
    normalize_description, normalize_learning_goal, parse_story_points, validate_story_points,
};
pub use learnbuddy_db::models::SubTask;
pub use tree::{IntegrityViolation, TaskTree};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A top-level learning task.
///
/// `is_new` is UI state only: it is set when the task first appears in the
/// tree and cleared shortly after. It is never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub description: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub story_points: u32,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub is_new: bool,
    #[serde(default)]
    pub subtasks: Vec<SubTask>,
}

impl Task {
    /// A fresh, pending task with no subtasks.
    pub fn new(id: Uuid, description: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            description: description.into(),
            completed: false,
            story_points: 0,
            created_at,
            is_new: false,
            subtasks: Vec::new(),
        }
    }

    /// Number of completed subtasks.
    pub fn completed_subtasks(&self) -> usize {
        self.subtasks.iter().filter(|s| s.completed).count()
    }
}

/// Constructors for [`SubTask`], which lives in the db crate.
pub trait SubTaskExt {
    fn pending(id: Uuid, parent_id: Uuid, description: String, created_at: DateTime<Utc>) -> Self;
}

impl SubTaskExt for SubTask {
    fn pending(id: Uuid, parent_id: Uuid, description: String, created_at: DateTime<Utc>) -> Self {
        SubTask {
            id,
            description,
            completed: false,
            parent_id,
            created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Store payloads
// ---------------------------------------------------------------------------

/// Data for a task that does not exist in a store yet.
///
/// `client_id` is the placeholder id used in the tree. Stores may keep it or
/// assign their own; the created [`Task`] carries the id that stuck.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub client_id: Uuid,
    pub description: String,
    pub completed: bool,
    pub story_points: u32,
    pub created_at: DateTime<Utc>,
    pub subtasks: Vec<SubTask>,
}

impl NewTask {
    /// Build the store payload for a task already placed in the tree.
    pub fn from_task(task: &Task) -> Self {
        Self {
            client_id: task.id,
            description: task.description.clone(),
            completed: task.completed,
            story_points: task.story_points,
            created_at: task.created_at,
            subtasks: task.subtasks.clone(),
        }
    }

    /// The task as it looks when stored under `client_id`.
    pub fn into_task(self) -> Task {
        let id = self.client_id;
        Task {
            id,
            description: self.description,
            completed: self.completed,
            story_points: self.story_points,
            created_at: self.created_at,
            is_new: false,
            subtasks: self
                .subtasks
                .into_iter()
                .map(|sub| SubTask { parent_id: id, ..sub })
                .collect(),
        }
    }
}

/// A partial update of a stored task. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub completed: Option<bool>,
    pub story_points: Option<u32>,
    /// Replaces the whole subtask list.
    pub subtasks: Option<Vec<SubTask>>,
}

impl TaskPatch {
    pub fn completed(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Self::default()
        }
    }

    pub fn story_points(points: u32) -> Self {
        Self {
            story_points: Some(points),
            ..Self::default()
        }
    }

    pub fn subtasks(subtasks: Vec<SubTask>) -> Self {
        Self {
            subtasks: Some(subtasks),
            ..Self::default()
        }
    }

    /// Apply the patch to a task in place.
    pub fn apply(&self, task: &mut Task) {
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        if let Some(points) = self.story_points {
            task.story_points = points;
        }
        if let Some(subtasks) = &self.subtasks {
            task.subtasks = subtasks.clone();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
