//! Core domain types
//!
//! The entities a build revolves around. These are shared between the
//! orchestrator (which persists them) and the runner (which executes them).

pub mod platform;
pub mod project;
pub mod run;
pub mod task;
