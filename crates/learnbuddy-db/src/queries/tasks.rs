//! Database query functions for the `tasks` table.
//!
//! Every function takes the owner identity and filters on `owner_id`, so a
//! row belonging to another user behaves exactly like a missing row.

use anyhow::{Context, Result};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::models::{SubTask, TaskInsert, TaskRow, TaskUpdate};

/// Insert one task on an existing connection (or transaction).
///
/// The row id is generated here and written into every embedded subtask's
/// `parent_id`.
async fn insert_on(conn: &mut PgConnection, owner_id: &str, new: &TaskInsert) -> Result<TaskRow> {
    let id = Uuid::new_v4();
    let subtasks: Vec<SubTask> = new
        .subtasks
        .iter()
        .cloned()
        .map(|sub| SubTask {
            parent_id: id,
            ..sub
        })
        .collect();

    let row = sqlx::query_as::<_, TaskRow>(
        "INSERT INTO tasks (id, owner_id, description, completed, story_points, created_at, subtasks) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING *",
    )
    .bind(id)
    .bind(owner_id)
    .bind(&new.description)
    .bind(new.completed)
    .bind(new.story_points)
    .bind(new.created_at)
    .bind(Json(&subtasks))
    .fetch_one(conn)
    .await
    .with_context(|| format!("failed to insert task {:?}", new.description))?;

    Ok(row)
}

/// Insert a new task row for `owner_id`. Returns the row with its new id.
pub async fn insert_task(pool: &PgPool, owner_id: &str, new: &TaskInsert) -> Result<TaskRow> {
    let mut conn = pool
        .acquire()
        .await
        .context("failed to acquire connection")?;
    insert_on(&mut *conn, owner_id, new).await
}

/// Insert several task rows inside a single transaction.
///
/// Either every row is inserted or none is. Rows are returned in input
/// order.
pub async fn insert_tasks(
    pool: &PgPool,
    owner_id: &str,
    batch: &[TaskInsert],
) -> Result<Vec<TaskRow>> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let mut rows = Vec::with_capacity(batch.len());
    for new in batch {
        // Transaction rolls back on drop if this returns early.
        rows.push(insert_on(&mut *tx, owner_id, new).await?);
    }

    tx.commit().await.context("failed to commit transaction")?;
    Ok(rows)
}

/// Fetch a single task by id within the owner's namespace.
pub async fn get_task(pool: &PgPool, owner_id: &str, id: Uuid) -> Result<Option<TaskRow>> {
    let row = sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE id = $1 AND owner_id = $2")
        .bind(id)
        .bind(owner_id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch task")?;

    Ok(row)
}

/// List the owner's tasks, newest first.
pub async fn list_tasks(pool: &PgPool, owner_id: &str) -> Result<Vec<TaskRow>> {
    let rows = sqlx::query_as::<_, TaskRow>(
        "SELECT * FROM tasks WHERE owner_id = $1 ORDER BY created_at DESC, id",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await
    .context("failed to list tasks")?;

    Ok(rows)
}

/// Apply a partial update. Returns the number of rows affected (0 means the
/// task does not exist in this namespace). An empty update writes nothing
/// and only checks that the task exists.
pub async fn update_task(
    pool: &PgPool,
    owner_id: &str,
    id: Uuid,
    update: &TaskUpdate,
) -> Result<u64> {
    if update.is_empty() {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM tasks WHERE id = $1 AND owner_id = $2)",
        )
        .bind(id)
        .bind(owner_id)
        .fetch_one(pool)
        .await
        .with_context(|| format!("failed to look up task {id}"))?;
        return Ok(u64::from(exists));
    }

    let result = sqlx::query(
        "UPDATE tasks \
         SET completed = COALESCE($1, completed), \
             story_points = COALESCE($2, story_points), \
             subtasks = COALESCE($3, subtasks) \
         WHERE id = $4 AND owner_id = $5",
    )
    .bind(update.completed)
    .bind(update.story_points)
    .bind(update.subtasks.as_ref().map(Json))
    .bind(id)
    .bind(owner_id)
    .execute(pool)
    .await
    .with_context(|| format!("failed to update task {id}"))?;

    Ok(result.rows_affected())
}

/// Delete one task (and with it, its embedded subtasks).
pub async fn delete_task(pool: &PgPool, owner_id: &str, id: Uuid) -> Result<u64> {
    let result = sqlx::query("DELETE FROM tasks WHERE id = $1 AND owner_id = $2")
        .bind(id)
        .bind(owner_id)
        .execute(pool)
        .await
        .with_context(|| format!("failed to delete task {id}"))?;

    Ok(result.rows_affected())
}

/// Delete every completed task of the owner in one statement.
pub async fn delete_completed_tasks(pool: &PgPool, owner_id: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM tasks WHERE owner_id = $1 AND completed")
        .bind(owner_id)
        .execute(pool)
        .await
        .context("failed to delete completed tasks")?;

    Ok(result.rows_affected())
}

/// Task counts for one owner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskCounts {
    pub pending: i64,
    pub completed: i64,
    pub total: i64,
}

/// Count the owner's tasks by completion state.
pub async fn count_tasks(pool: &PgPool, owner_id: &str) -> Result<TaskCounts> {
    let rows: Vec<(bool, i64)> = sqlx::query_as(
        "SELECT completed, COUNT(*) FROM tasks WHERE owner_id = $1 GROUP BY completed",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await
    .context("failed to count tasks")?;

    let mut counts = TaskCounts::default();
    for (completed, count) in rows {
        if completed {
            counts.completed = count;
        } else {
            counts.pending = count;
        }
        counts.total += count;
    }
    Ok(counts)
}
