//! Error handling for the Groovebox server
//!
//! This module provides the unified error type for the background task
//! subsystem using thiserror. Failures inside a single task execution are
//! deliberately *not* represented here: they are contained to that task's
//! status (see `crate::tasks::executor::ExecutorError`) and never surface
//! to the submitter as a synchronous error.

use thiserror::Error;
use uuid::Uuid;

/// Main server error type
#[derive(Error, Debug)]
pub enum ServerError {
    // ========== Submission Errors ==========
    /// Payload failed validation before anything was persisted or enqueued
    #[error("invalid task payload: {0}")]
    InvalidPayload(String),

    /// Playlist resolution failed before any task was submitted
    #[error("playlist lookup failed: {0}")]
    PlaylistLookup(String),

    // ========== Lookup Errors ==========
    /// Requested task ids that do not resolve to tasks owned by the caller
    #[error("could not find task ids {ids:?}")]
    TasksNotFound { ids: Vec<Uuid> },

    // ========== Database Errors ==========
    /// Database query failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    // ========== Internal Errors ==========
    /// Internal error (catch-all for unexpected failures)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for server operations
pub type ServerResult<T> = Result<T, ServerError>;
