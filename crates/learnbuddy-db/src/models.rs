use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Embedded records
// ---------------------------------------------------------------------------

/// A subtask, stored inside its parent's `subtasks` array.
///
/// Field names match the task document shape (`parentId`, `createdAt`), so
/// the same record is used for the `jsonb` column and the local snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubTask {
    pub id: Uuid,
    pub description: String,
    #[serde(default)]
    pub completed: bool,
    /// Id of the owning task. Relational only.
    pub parent_id: Uuid,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A task document as stored in the `tasks` table.
#[derive(Debug, Clone, FromRow)]
pub struct TaskRow {
    pub id: Uuid,
    /// Identity of the user whose namespace this row belongs to.
    pub owner_id: String,
    pub description: String,
    pub completed: bool,
    pub story_points: i64,
    pub created_at: DateTime<Utc>,
    pub subtasks: Json<Vec<SubTask>>,
}

// ---------------------------------------------------------------------------
// Write payloads
// ---------------------------------------------------------------------------

/// Column values for a new task row. The id is assigned at insert time.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskInsert {
    pub description: String,
    pub completed: bool,
    pub story_points: i64,
    pub created_at: DateTime<Utc>,
    /// Subtasks to embed. Their `parent_id` is rewritten to the new row id.
    pub subtasks: Vec<SubTask>,
}

/// A partial update. `None` leaves the column unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    pub completed: Option<bool>,
    pub story_points: Option<i64>,
    /// Replaces the whole embedded subtask array.
    pub subtasks: Option<Vec<SubTask>>,
}

impl TaskUpdate {
    /// True when the update would not touch any column.
    pub fn is_empty(&self) -> bool {
        self.completed.is_none() && self.story_points.is_none() && self.subtasks.is_none()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
