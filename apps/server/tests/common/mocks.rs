//! Mock collaborators for task processor integration tests
//!
//! Provides an in-memory `TaskStore` and scripted executor doubles so the
//! queue/dispatch core can be exercised without a database or network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use groovebox_server::error::ServerResult;
use groovebox_server::models::{BackgroundTask, DownloadPayload, ImportPayload, TaskStatus};
use groovebox_server::repositories::TaskStore;
use groovebox_server::tasks::{DownloadExecutor, ExecutorError, ImportExecutor, PlaylistEntry};

/// In-memory task store double
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: Mutex<HashMap<Uuid, BackgroundTask>>,
}

impl MemoryTaskStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Insert a record directly, bypassing submission (crash simulations)
    pub fn seed(&self, task: BackgroundTask) {
        self.tasks.lock().unwrap().insert(task.id, task);
    }

    pub fn get(&self, id: Uuid) -> Option<BackgroundTask> {
        self.tasks.lock().unwrap().get(&id).cloned()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn save(&self, task: &BackgroundTask) -> ServerResult<()> {
        self.tasks.lock().unwrap().insert(task.id, task.clone());
        Ok(())
    }

    async fn save_all(&self, tasks: &[BackgroundTask]) -> ServerResult<()> {
        let mut map = self.tasks.lock().unwrap();
        for task in tasks {
            map.insert(task.id, task.clone());
        }
        Ok(())
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> ServerResult<Vec<BackgroundTask>> {
        let map = self.tasks.lock().unwrap();
        Ok(ids.iter().filter_map(|id| map.get(id).cloned()).collect())
    }

    async fn find_by_status(
        &self,
        statuses: &[TaskStatus],
        user_id: Option<Uuid>,
    ) -> ServerResult<Vec<BackgroundTask>> {
        let map = self.tasks.lock().unwrap();
        let mut tasks: Vec<BackgroundTask> = map
            .values()
            .filter(|t| statuses.contains(&t.status))
            .filter(|t| user_id.map(|u| t.user_id == u).unwrap_or(true))
            .cloned()
            .collect();
        // Submission order, like the SQL implementation
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(tasks)
    }
}

/// Download executor double, scripted by URL scheme:
///
/// - `fail://...`  -> returns a download error
/// - `panic://...` -> panics mid-execution
/// - `hang://...`  -> sleeps far past any reasonable timeout
/// - anything else -> sleeps `delay`, records the url, returns a fresh id
///
/// Also probes concurrency: `max_in_flight` records the largest number of
/// simultaneously running executions ever observed.
pub struct ProbeDownloader {
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    completed: Mutex<Vec<String>>,
}

impl ProbeDownloader {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            completed: Mutex::new(Vec::new()),
        })
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// URLs of successful downloads, in completion order
    pub fn completed(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }
}

#[async_trait]
impl DownloadExecutor for ProbeDownloader {
    async fn execute(
        &self,
        payload: &DownloadPayload,
        _user_id: Uuid,
    ) -> Result<Uuid, ExecutorError> {
        if payload.url.starts_with("fail://") {
            return Err(ExecutorError::Download("scripted failure".to_string()));
        }
        if payload.url.starts_with("panic://") {
            panic!("scripted executor panic");
        }

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if payload.url.starts_with("hang://") {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        } else {
            tokio::time::sleep(self.delay).await;
        }

        self.completed.lock().unwrap().push(payload.url.clone());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(Uuid::new_v4())
    }

    async fn playlist_entries(&self, url: &str) -> Result<Vec<PlaylistEntry>, ExecutorError> {
        if !url.contains("playlist") {
            return Err(ExecutorError::External("not a playlist url".to_string()));
        }
        Ok((1..=3)
            .map(|i| PlaylistEntry {
                url: format!("https://example.com/v/{i}"),
                title: format!("Playlist Song {i}"),
            })
            .collect())
    }
}

/// Import executor double: matches are scripted per track name, anything
/// unscripted is a `NoMatch`.
#[derive(Default)]
pub struct ScriptedImporter {
    matches: Mutex<HashMap<String, Uuid>>,
    calls: AtomicUsize,
}

impl ScriptedImporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_match(&self, name: &str, track_id: Uuid) {
        self.matches
            .lock()
            .unwrap()
            .insert(name.to_string(), track_id);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImportExecutor for ScriptedImporter {
    async fn execute(
        &self,
        payload: &ImportPayload,
        _user_id: Uuid,
    ) -> Result<Uuid, ExecutorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.matches.lock().unwrap().get(&payload.name) {
            Some(track_id) => Ok(*track_id),
            None => Err(ExecutorError::NoMatch),
        }
    }
}
