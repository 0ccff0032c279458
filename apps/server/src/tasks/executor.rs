//! Executor contracts for each task kind
//!
//! The processor never knows how a download or an import is actually
//! performed; it dispatches to these traits and folds any error into the
//! task's `Failed` status. Recovery retries interrupted tasks from scratch
//! with the same payload, so implementations must tolerate being invoked
//! more than once for the same logical unit of work.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{DownloadPayload, ImportPayload};

/// Why a single task execution failed.
///
/// These never propagate to the submitter; the worker turns every variant
/// into a `Failed` status transition and a log line.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// A search legitimately found nothing to import
    #[error("no matching track found")]
    NoMatch,

    /// The download itself failed
    #[error("download failed: {0}")]
    Download(String),

    /// An upstream service misbehaved
    #[error("external service error: {0}")]
    External(String),

    /// Execution exceeded the configured per-task budget
    #[error("task timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// Catch-all, including panics caught at the per-task boundary
    #[error("internal executor error: {0}")]
    Internal(String),
}

/// One entry of a resolved external playlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    /// Direct URL for this entry
    pub url: String,
    /// Display title, used as the task description
    pub title: String,
}

/// Performs `ExternalDownload` tasks: fetch audio from a source URL,
/// hand it to the media pipeline, and return the new track's id.
#[async_trait]
pub trait DownloadExecutor: Send + Sync {
    async fn execute(
        &self,
        payload: &DownloadPayload,
        user_id: Uuid,
    ) -> Result<Uuid, ExecutorError>;

    /// Expand a playlist URL into its individual entries, so each can be
    /// submitted as its own download task.
    async fn playlist_entries(&self, url: &str) -> Result<Vec<PlaylistEntry>, ExecutorError>;
}

/// Performs `MetadataImport` tasks: search the external source for the
/// described track, download the best match, and return the new track's
/// id. An empty search result is `Err(ExecutorError::NoMatch)`.
#[async_trait]
pub trait ImportExecutor: Send + Sync {
    async fn execute(&self, payload: &ImportPayload, user_id: Uuid)
        -> Result<Uuid, ExecutorError>;
}

/// One executor per task kind, shared by every worker
#[derive(Clone)]
pub struct TaskExecutors {
    pub download: Arc<dyn DownloadExecutor>,
    pub import: Arc<dyn ImportExecutor>,
}

impl TaskExecutors {
    pub fn new(download: Arc<dyn DownloadExecutor>, import: Arc<dyn ImportExecutor>) -> Self {
        Self { download, import }
    }
}
