//! Background task processing
//!
//! Long-running work (downloading audio from an external source, finding
//! and importing a track by metadata) is accepted here, persisted, queued
//! per user, and executed asynchronously. The guarantees:
//!
//! - at most one worker is active per user, so a user's tasks run
//!   serially in submission order;
//! - workers for different users run fully in parallel;
//! - every status transition is persisted before its event is published;
//! - a failing, panicking, or hung task fails alone - the worker moves on
//!   to the user's next task;
//! - unfinished work survives a process restart via `recover`.

pub mod executor;
pub mod queue;

pub use executor::{
    DownloadExecutor, ExecutorError, ImportExecutor, PlaylistEntry, TaskExecutors,
};
pub use queue::{EnqueueOutcome, UserQueues};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use groovebox_shared_config::TaskConfig;
use tokio::time::timeout;
use uuid::Uuid;

use crate::error::{ServerError, ServerResult};
use crate::events::{TaskEventBus, TaskStatusEvent};
use crate::models::{ActorContext, BackgroundTask, DownloadPayload, TaskPayload, TaskStatus};
use crate::repositories::TaskStore;

/// Accepts, queues, executes, and recovers background tasks.
///
/// Cheap to clone; all clones share the same queue table and workers.
#[derive(Clone)]
pub struct TaskProcessor {
    inner: Arc<ProcessorInner>,
}

struct ProcessorInner {
    store: Arc<dyn TaskStore>,
    executors: TaskExecutors,
    events: TaskEventBus,
    queues: UserQueues,
    task_timeout: Duration,
}

impl TaskProcessor {
    pub fn new(
        store: Arc<dyn TaskStore>,
        executors: TaskExecutors,
        events: TaskEventBus,
        config: &TaskConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ProcessorInner {
                store,
                executors,
                events,
                queues: UserQueues::new(),
                task_timeout: Duration::from_secs(config.task_timeout_secs),
            }),
        }
    }

    /// The event bus status transitions are published on
    pub fn events(&self) -> &TaskEventBus {
        &self.inner.events
    }

    /// Accept one unit of background work for the submitting user.
    ///
    /// The task is persisted as `Pending` and queued; if no worker is
    /// active for the user, exactly one is started. Returns as soon as the
    /// task is queued - never waits for execution.
    pub async fn submit(
        &self,
        ctx: &ActorContext,
        payload: TaskPayload,
        description_override: Option<String>,
    ) -> ServerResult<BackgroundTask> {
        payload.validate()?;

        let description = description_override.unwrap_or_else(|| payload.describe());
        let task = BackgroundTask::new(ctx, payload, description);

        self.inner.store.save(&task).await?;
        self.inner
            .events
            .publish(TaskStatusEvent::new(task.clone(), None))
            .await;

        if self.inner.queues.enqueue(task.clone()) == EnqueueOutcome::StartWorker {
            self.spawn_worker(ctx.user_id);
        }

        Ok(task)
    }

    /// Expand an external playlist URL into one download task per entry,
    /// using each entry's title as the task description.
    pub async fn submit_playlist(
        &self,
        ctx: &ActorContext,
        url: &str,
    ) -> ServerResult<Vec<BackgroundTask>> {
        let entries = self
            .inner
            .executors
            .download
            .playlist_entries(url)
            .await
            .map_err(|e| ServerError::PlaylistLookup(e.to_string()))?;

        let mut tasks = Vec::with_capacity(entries.len());
        for entry in entries {
            let payload = TaskPayload::ExternalDownload(DownloadPayload {
                url: entry.url,
                ..Default::default()
            });
            tasks.push(self.submit(ctx, payload, Some(entry.title)).await?);
        }
        Ok(tasks)
    }

    /// Fetch the given tasks, requiring every id to resolve to a task
    /// owned by the caller. Fails - naming exactly the missing ids - if
    /// any does not; partial results are never returned.
    pub async fn get_by_ids(
        &self,
        user_id: Uuid,
        ids: &[Uuid],
    ) -> ServerResult<Vec<BackgroundTask>> {
        let found = self.inner.store.find_by_ids(ids).await?;
        let owned: Vec<BackgroundTask> =
            found.into_iter().filter(|t| t.user_id == user_id).collect();

        let missing: Vec<Uuid> = ids
            .iter()
            .copied()
            .filter(|id| !owned.iter().any(|t| t.id == *id))
            .collect();
        if !missing.is_empty() {
            return Err(ServerError::TasksNotFound { ids: missing });
        }

        Ok(owned)
    }

    /// Every task of this user that has not reached a terminal status
    pub async fn get_unfinished(&self, user_id: Uuid) -> ServerResult<Vec<BackgroundTask>> {
        self.inner
            .store
            .find_by_status(&TaskStatus::UNFINISHED, Some(user_id))
            .await
    }

    /// Reconcile work left over from a previous process instance. Must run
    /// once at startup, before any submissions are accepted.
    ///
    /// Tasks found `Running` imply an unclean shutdown; they are reset to
    /// `Pending` and the whole batch of resets is persisted before any
    /// worker starts, so no task can ever stay stuck in `Running`. The
    /// remaining pending work is grouped per user and one worker is
    /// started for each user with leftovers.
    pub async fn recover(&self) -> ServerResult<()> {
        let mut tasks = self
            .inner
            .store
            .find_by_status(&TaskStatus::UNFINISHED, None)
            .await?;

        let mut interrupted = Vec::new();
        for task in &mut tasks {
            if task.status == TaskStatus::Running {
                task.transition(TaskStatus::Pending);
                interrupted.push(task.clone());
            }
        }
        if !interrupted.is_empty() {
            self.inner.store.save_all(&interrupted).await?;
            tracing::info!(
                count = interrupted.len(),
                "reset tasks interrupted mid-execution back to pending"
            );
        }

        let mut by_user: HashMap<Uuid, Vec<BackgroundTask>> = HashMap::new();
        for task in tasks {
            by_user.entry(task.user_id).or_default().push(task);
        }

        for (user_id, user_tasks) in by_user {
            tracing::info!(
                user_id = %user_id,
                count = user_tasks.len(),
                "resuming unfinished background tasks"
            );
            if self.inner.queues.install(user_id, user_tasks) {
                self.spawn_worker(user_id);
            }
        }

        Ok(())
    }

    fn spawn_worker(&self, user_id: Uuid) {
        tracing::info!(user_id = %user_id, "starting background task worker");
        let processor = self.clone();
        tokio::spawn(async move {
            processor.drain_user_queue(user_id).await;
        });
    }

    /// Worker loop: serially drain one user's queue to empty. Emptiness
    /// and the active-flag release are a single atomic step inside
    /// `next_or_release`, so no submission can slip past a dying worker.
    async fn drain_user_queue(&self, user_id: Uuid) {
        while let Some(task) = self.inner.queues.next_or_release(user_id) {
            tracing::info!(
                task_id = %task.id,
                user_id = %user_id,
                kind = %task.kind,
                "processing background task"
            );
            self.run_task(task).await;
        }
        tracing::info!(user_id = %user_id, "background task queue drained");
    }

    /// Drive one task through `Running` to a terminal status. Every
    /// failure mode - executor error, panic, timeout, even a persistence
    /// error - is contained to this task.
    async fn run_task(&self, mut task: BackgroundTask) {
        if let Err(e) = self
            .transition_and_publish(&mut task, TaskStatus::Running, None)
            .await
        {
            tracing::error!(task_id = %task.id, error = %e, "could not mark task running");
            let _ = self
                .transition_and_publish(&mut task, TaskStatus::Failed, None)
                .await;
            return;
        }

        match self.invoke_executor(&task).await {
            Ok(track_id) => {
                if let Err(e) = self
                    .transition_and_publish(&mut task, TaskStatus::Complete, Some(track_id))
                    .await
                {
                    tracing::error!(task_id = %task.id, error = %e, "could not mark task complete");
                }
            }
            Err(error) => {
                tracing::warn!(
                    task_id = %task.id,
                    user_id = %task.user_id,
                    error = %error,
                    "background task failed"
                );
                if let Err(e) = self
                    .transition_and_publish(&mut task, TaskStatus::Failed, None)
                    .await
                {
                    tracing::error!(task_id = %task.id, error = %e, "could not mark task failed");
                }
            }
        }
    }

    /// Persist a status transition, then publish it. Persist-first is what
    /// lets a subscriber re-read storage at any moment without seeing a
    /// notification "from the future".
    async fn transition_and_publish(
        &self,
        task: &mut BackgroundTask,
        status: TaskStatus,
        track_id: Option<Uuid>,
    ) -> ServerResult<()> {
        task.transition(status);
        self.inner.store.save(task).await?;
        self.inner
            .events
            .publish(TaskStatusEvent::new(task.clone(), track_id))
            .await;
        Ok(())
    }

    /// Closed dispatch over the task kind, bounded by the configured
    /// timeout. The executor runs on its own spawned task so a panic
    /// surfaces as a `JoinError` here instead of killing the worker.
    async fn invoke_executor(&self, task: &BackgroundTask) -> Result<Uuid, ExecutorError> {
        let executors = self.inner.executors.clone();
        let payload = task.payload.clone();
        let user_id = task.user_id;

        let mut handle = tokio::spawn(async move {
            match payload {
                TaskPayload::ExternalDownload(payload) => {
                    executors.download.execute(&payload, user_id).await
                }
                TaskPayload::MetadataImport(payload) => {
                    executors.import.execute(&payload, user_id).await
                }
            }
        });

        match timeout(self.inner.task_timeout, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                if join_error.is_panic() {
                    Err(ExecutorError::Internal(format!(
                        "executor panicked: {join_error}"
                    )))
                } else {
                    Err(ExecutorError::Internal(format!(
                        "executor aborted: {join_error}"
                    )))
                }
            }
            Err(_elapsed) => {
                handle.abort();
                Err(ExecutorError::Timeout {
                    seconds: self.inner.task_timeout.as_secs(),
                })
            }
        }
    }
}
