//! Kiln Runner
//!
//! The build execution engine: turns a run of a task into a synchronized
//! working copy, a compiler invocation with a derived environment, captured
//! logs and a published artifact.
//!
//! Architecture:
//! - Configuration: directories, timeouts and publishing settings
//! - Source: git working copy synchronization
//! - Process: external command execution with streamed output
//! - Execution: the per-run step sequence and its state transitions
//! - Repository: the seam through which run progress is persisted

pub mod config;
pub mod env;
pub mod execution;
pub mod layout;
pub mod process;
pub mod repository;
pub mod source;
pub mod toolchain;

#[cfg(test)]
mod testing;
