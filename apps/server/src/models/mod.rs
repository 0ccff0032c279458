//! Database models and types for Groovebox
//!
//! This module contains SQLx models for the background task subsystem:
//! the task record itself, its status state machine, and the typed
//! payloads for each task kind.

pub mod task;

pub use task::{
    ActorContext, BackgroundTask, DownloadPayload, ImportPayload, TaskKind, TaskPayload,
    TaskStatus,
};
