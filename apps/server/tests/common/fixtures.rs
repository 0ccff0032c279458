//! Test fixtures for task processor integration tests

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use groovebox_shared_config::TaskConfig;
use tokio::sync::broadcast;
use uuid::Uuid;

use groovebox_server::models::{
    ActorContext, BackgroundTask, DownloadPayload, ImportPayload, TaskPayload, TaskStatus,
};
use groovebox_server::tasks::TaskExecutors;
use groovebox_server::{TaskEventBus, TaskProcessor, TaskStatusEvent};

use super::mocks::{MemoryTaskStore, ProbeDownloader, ScriptedImporter};

pub fn actor() -> ActorContext {
    ActorContext {
        user_id: Uuid::new_v4(),
        device_id: Uuid::new_v4(),
    }
}

pub fn download(url: &str) -> TaskPayload {
    TaskPayload::ExternalDownload(DownloadPayload {
        url: url.to_string(),
        ..Default::default()
    })
}

pub fn import(name: &str, artist: &str) -> TaskPayload {
    TaskPayload::MetadataImport(ImportPayload {
        name: name.to_string(),
        artist: artist.to_string(),
        length_secs: Some(180),
        ..Default::default()
    })
}

/// Build a stored task directly, bypassing submission, e.g. to simulate a
/// record left behind by a crashed process. `age_secs` pushes the
/// timestamps into the past so submission order is deterministic.
pub fn stored_task(
    user_id: Uuid,
    payload: TaskPayload,
    status: TaskStatus,
    age_secs: i64,
) -> BackgroundTask {
    let ctx = ActorContext {
        user_id,
        device_id: Uuid::new_v4(),
    };
    let description = payload.describe();
    let mut task = BackgroundTask::new(&ctx, payload, description);
    task.status = status;
    task.created_at = Utc::now() - chrono::Duration::seconds(age_secs);
    task.updated_at = task.created_at;
    task
}

/// Everything an integration test needs, wired together with in-memory
/// doubles for every collaborator.
pub struct TestHarness {
    pub processor: TaskProcessor,
    pub store: Arc<MemoryTaskStore>,
    pub downloader: Arc<ProbeDownloader>,
    pub importer: Arc<ScriptedImporter>,
    pub events: TaskEventBus,
}

pub fn harness(executor_delay: Duration) -> TestHarness {
    harness_with_config(executor_delay, TaskConfig::default())
}

pub fn harness_with_timeout(executor_delay: Duration, task_timeout_secs: u64) -> TestHarness {
    harness_with_config(executor_delay, TaskConfig { task_timeout_secs })
}

fn harness_with_config(executor_delay: Duration, config: TaskConfig) -> TestHarness {
    let store = MemoryTaskStore::new();
    let downloader = ProbeDownloader::new(executor_delay);
    let importer = ScriptedImporter::new();
    let events = TaskEventBus::new_in_memory();

    let processor = TaskProcessor::new(
        store.clone(),
        TaskExecutors::new(downloader.clone(), importer.clone()),
        events.clone(),
        &config,
    );

    TestHarness {
        processor,
        store,
        downloader,
        importer,
        events,
    }
}

/// Receive the next event or fail loudly after five seconds
pub async fn next_event(rx: &mut broadcast::Receiver<TaskStatusEvent>) -> TaskStatusEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a task event")
        .expect("task event channel closed")
}

/// Skip ahead to the next terminal (complete/failed) event
pub async fn next_terminal_event(
    rx: &mut broadcast::Receiver<TaskStatusEvent>,
) -> TaskStatusEvent {
    loop {
        let event = next_event(rx).await;
        if event.task.status.is_terminal() {
            return event;
        }
    }
}
