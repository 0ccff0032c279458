//! Background task models
//!
//! A `BackgroundTask` is the persisted record of one unit of asynchronous
//! work (a download from an external source, or a metadata-driven import)
//! owned by exactly one user for its entire lifetime. The queue machinery
//! in `crate::tasks` only ever moves these records through the status
//! state machine; what the work actually *does* lives behind the executor
//! traits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{ServerError, ServerResult};

/// Status state machine for a background task.
///
/// Normal flow is `Pending -> Running -> Complete | Failed`. The single
/// backward edge, `Running -> Pending`, is taken only by startup recovery
/// when a previous process instance died mid-execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

impl TaskStatus {
    /// Statuses that still need (more) work
    pub const UNFINISHED: [TaskStatus; 2] = [TaskStatus::Pending, TaskStatus::Running];

    /// Whether this status is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

/// The closed set of background task kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    ExternalDownload,
    MetadataImport,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExternalDownload => write!(f, "external_download"),
            Self::MetadataImport => write!(f, "metadata_import"),
        }
    }
}

/// Parameters for downloading audio from an external source URL
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadPayload {
    /// Source URL to download from
    pub url: String,

    /// Track title, if the submitter knows it
    pub name: Option<String>,

    /// Artist name, if the submitter knows it
    pub artist: Option<String>,

    pub album: Option<String>,
    pub track_number: Option<i32>,
    pub release_year: Option<i32>,

    /// Album art URL to attach to the downloaded track
    pub art_url: Option<String>,
}

/// Parameters for finding and importing a track by its metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportPayload {
    /// Track title to search for
    pub name: String,

    /// Artist to search for
    pub artist: String,

    pub album: Option<String>,
    pub track_number: Option<i32>,
    pub release_year: Option<i32>,
    pub album_art_link: Option<String>,

    /// Expected track length in seconds, used to rank search results
    pub length_secs: Option<i32>,
}

/// Kind-specific task parameters, persisted as tagged JSONB.
///
/// Each task kind carries its own strongly-typed payload; dispatch in the
/// worker is a closed match over this enum. Adding a kind means adding a
/// variant, a payload struct, and an executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskPayload {
    ExternalDownload(DownloadPayload),
    MetadataImport(ImportPayload),
}

impl TaskPayload {
    /// The kind tag for this payload
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::ExternalDownload(_) => TaskKind::ExternalDownload,
            Self::MetadataImport(_) => TaskKind::MetadataImport,
        }
    }

    /// Reject obviously unusable payloads before anything is persisted
    pub fn validate(&self) -> ServerResult<()> {
        match self {
            Self::ExternalDownload(payload) => {
                if payload.url.trim().is_empty() {
                    return Err(ServerError::InvalidPayload(
                        "download url must not be empty".to_string(),
                    ));
                }
            }
            Self::MetadataImport(payload) => {
                if payload.name.trim().is_empty() || payload.artist.trim().is_empty() {
                    return Err(ServerError::InvalidPayload(
                        "import requires both a track name and an artist".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Default human-readable summary when the submitter gives no override.
    ///
    /// Downloads prefer "name - artist" when both are known, then whichever
    /// of the name or the source URL is known. Imports always have both.
    pub fn describe(&self) -> String {
        match self {
            Self::ExternalDownload(payload) => match (&payload.name, &payload.artist) {
                (Some(name), Some(artist)) => format!("{} - {}", name, artist),
                (Some(name), None) => name.clone(),
                _ => payload.url.clone(),
            },
            Self::MetadataImport(payload) => format!("{} - {}", payload.name, payload.artist),
        }
    }
}

/// Identity of the submitter: which user owns the task and which of their
/// devices asked for it. The processor records this, it never authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorContext {
    pub user_id: Uuid,
    pub device_id: Uuid,
}

/// A persisted unit of asynchronous work and its status
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct BackgroundTask {
    /// Unique task identifier, immutable once assigned
    pub id: Uuid,

    /// Owning user; the partition key for queueing and ordering
    pub user_id: Uuid,

    /// Device that submitted the task (event routing only)
    pub device_id: Uuid,

    /// Kind tag, always consistent with `payload`
    pub kind: TaskKind,

    /// Kind-specific parameters
    #[sqlx(json)]
    pub payload: TaskPayload,

    pub status: TaskStatus,

    /// Display-only summary, independent of the payload
    pub description: String,

    pub created_at: DateTime<Utc>,

    /// Advances on every status transition
    pub updated_at: DateTime<Utc>,
}

impl BackgroundTask {
    /// Build a new `Pending` task for the given submitter
    pub fn new(ctx: &ActorContext, payload: TaskPayload, description: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: ctx.user_id,
            device_id: ctx.device_id,
            kind: payload.kind(),
            payload,
            status: TaskStatus::Pending,
            description,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move the task to a new status, advancing `updated_at`
    pub fn transition(&mut self, status: TaskStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}
