//! Postgres-backed store. Each identity sees only rows it owns.

use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use learnbuddy_db::models::{TaskInsert, TaskRow, TaskUpdate};
use learnbuddy_db::queries::tasks as db;

use super::TaskStore;
use crate::error::StoreError;
use crate::identity::Identity;
use crate::model::{NewTask, Task, TaskPatch};

/// Remote store over a shared connection pool.
#[derive(Debug, Clone)]
pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn task_from_row(row: TaskRow) -> Result<Task, StoreError> {
    let story_points = u32::try_from(row.story_points).with_context(|| {
        format!("task {} has out-of-range story points {}", row.id, row.story_points)
    })?;
    Ok(Task {
        id: row.id,
        description: row.description,
        completed: row.completed,
        story_points,
        created_at: row.created_at,
        is_new: false,
        subtasks: row.subtasks.0,
    })
}

fn insert_from_new(data: NewTask) -> TaskInsert {
    TaskInsert {
        description: data.description,
        completed: data.completed,
        story_points: i64::from(data.story_points),
        created_at: data.created_at,
        subtasks: data.subtasks,
    }
}

fn update_from_patch(patch: TaskPatch) -> TaskUpdate {
    TaskUpdate {
        completed: patch.completed,
        story_points: patch.story_points.map(i64::from),
        subtasks: patch.subtasks,
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn list_tasks(&self, owner: &Identity) -> Result<Vec<Task>, StoreError> {
        let rows = db::list_tasks(&self.pool, owner.as_str()).await?;
        debug!(owner = %owner, count = rows.len(), "listed tasks");
        rows.into_iter().map(task_from_row).collect()
    }

    async fn create_task(&self, owner: &Identity, data: NewTask) -> Result<Task, StoreError> {
        let client_id = data.client_id;
        let row = db::insert_task(&self.pool, owner.as_str(), &insert_from_new(data)).await?;
        debug!(owner = %owner, %client_id, id = %row.id, "created task");
        task_from_row(row)
    }

    async fn update_task(
        &self,
        owner: &Identity,
        id: Uuid,
        patch: TaskPatch,
    ) -> Result<(), StoreError> {
        let update = update_from_patch(patch);
        let affected = db::update_task(&self.pool, owner.as_str(), id, &update).await?;
        if affected == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn delete_task(&self, owner: &Identity, id: Uuid) -> Result<(), StoreError> {
        let affected = db::delete_task(&self.pool, owner.as_str(), id).await?;
        if affected == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn bulk_delete_completed(&self, owner: &Identity) -> Result<u64, StoreError> {
        let deleted = db::delete_completed_tasks(&self.pool, owner.as_str()).await?;
        debug!(owner = %owner, deleted, "deleted completed tasks");
        Ok(deleted)
    }

    async fn bulk_create(
        &self,
        owner: &Identity,
        data: Vec<NewTask>,
    ) -> Result<Vec<Task>, StoreError> {
        let batch: Vec<TaskInsert> = data.into_iter().map(insert_from_new).collect();
        let rows = db::insert_tasks(&self.pool, owner.as_str(), &batch).await?;
        debug!(owner = %owner, count = rows.len(), "created task batch");
        rows.into_iter().map(task_from_row).collect()
    }
}
