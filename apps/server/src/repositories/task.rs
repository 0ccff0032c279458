//! Task repository for centralized database operations
//!
//! This module provides all background-task database operations in a single
//! location, following the repository pattern. `TaskStore` is the narrow
//! contract the queue core depends on; `PgTaskStore` is the PostgreSQL
//! implementation backed by the `background_tasks` table (see the
//! `migrations/` directory for the schema).

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::ServerResult;
use crate::models::{BackgroundTask, TaskStatus};

/// Columns selected for every task query, in `BackgroundTask` field order
const TASK_COLUMNS: &str =
    "id, user_id, device_id, kind, payload, status, description, created_at, updated_at";

/// Durable CRUD over task records.
///
/// `save` has upsert semantics keyed on the task id: the same record is
/// saved once at submission and again on every status transition.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a task, or update its mutable fields if it already exists
    async fn save(&self, task: &BackgroundTask) -> ServerResult<()>;

    /// Save a batch of tasks atomically (used by recovery resets)
    async fn save_all(&self, tasks: &[BackgroundTask]) -> ServerResult<()>;

    /// Find tasks by id, across all users
    async fn find_by_ids(&self, ids: &[Uuid]) -> ServerResult<Vec<BackgroundTask>>;

    /// Find tasks in any of the given statuses, in submission order,
    /// optionally restricted to one user. The unfiltered form is what
    /// recovery uses to see every user's leftover work.
    async fn find_by_status(
        &self,
        statuses: &[TaskStatus],
        user_id: Option<Uuid>,
    ) -> ServerResult<Vec<BackgroundTask>>;
}

/// Repository for background task database operations
#[derive(Clone)]
pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    /// Create a new PgTaskStore instance
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn save(&self, task: &BackgroundTask) -> ServerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO background_tasks
                (id, user_id, device_id, kind, payload, status, description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                description = EXCLUDED.description,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(task.id)
        .bind(task.user_id)
        .bind(task.device_id)
        .bind(task.kind)
        .bind(sqlx::types::Json(&task.payload))
        .bind(task.status)
        .bind(&task.description)
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_all(&self, tasks: &[BackgroundTask]) -> ServerResult<()> {
        let mut tx = self.pool.begin().await?;
        for task in tasks {
            sqlx::query(
                r#"
                UPDATE background_tasks
                SET status = $2, updated_at = $3
                WHERE id = $1
                "#,
            )
            .bind(task.id)
            .bind(task.status)
            .bind(task.updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> ServerResult<Vec<BackgroundTask>> {
        let sql = format!(
            "SELECT {} FROM background_tasks WHERE id = ANY($1)",
            TASK_COLUMNS
        );
        let tasks = sqlx::query_as::<_, BackgroundTask>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(tasks)
    }

    async fn find_by_status(
        &self,
        statuses: &[TaskStatus],
        user_id: Option<Uuid>,
    ) -> ServerResult<Vec<BackgroundTask>> {
        let tasks = match user_id {
            Some(user_id) => {
                let sql = format!(
                    "SELECT {} FROM background_tasks
                     WHERE status = ANY($1) AND user_id = $2
                     ORDER BY created_at ASC",
                    TASK_COLUMNS
                );
                sqlx::query_as::<_, BackgroundTask>(&sql)
                    .bind(statuses)
                    .bind(user_id)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM background_tasks
                     WHERE status = ANY($1)
                     ORDER BY created_at ASC",
                    TASK_COLUMNS
                );
                sqlx::query_as::<_, BackgroundTask>(&sql)
                    .bind(statuses)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(tasks)
    }
}
