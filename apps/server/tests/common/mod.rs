//! Common test utilities for task processor integration tests
//!
//! This module provides shared test infrastructure: an in-memory task
//! store, scripted executor doubles, and fixture builders.

#![allow(unused_imports)]
#![allow(dead_code)]

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;
