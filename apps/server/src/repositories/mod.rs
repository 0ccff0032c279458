//! Database repository layer for Groovebox
//!
//! This module provides the data access layer, centralizing all database
//! operations into reusable repositories. The task store is expressed as a
//! trait so the queue core can be exercised against an in-memory double in
//! tests and is never coupled to a live database.

pub mod task;

pub use task::{PgTaskStore, TaskStore};
