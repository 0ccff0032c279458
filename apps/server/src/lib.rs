//! Groovebox server library
//!
//! This module exposes the background task subsystem for use in
//! integration tests and as a library: the task model, the durable store,
//! the per-user queue/dispatch core, and the status event bus.

pub mod error;
pub mod events;
pub mod models;
pub mod repositories;
pub mod tasks;

// Re-export commonly used types
pub use error::{ServerError, ServerResult};
pub use events::{TaskEventBus, TaskStatusEvent};
pub use models::{ActorContext, BackgroundTask, TaskKind, TaskPayload, TaskStatus};
pub use tasks::TaskProcessor;
