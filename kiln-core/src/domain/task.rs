//! Task domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::platform::{TargetArch, TargetOs};

/// A build recipe bound to exactly one project
///
/// Only `auto_build` changes after creation; re-create the task to change
/// anything else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub project_id: Uuid,
    pub branch: String,
    /// Entry point, relative to the project's working copy
    pub main_file: String,
    /// Artifact file name
    pub dest_file: String,
    pub target_os: TargetOs,
    pub target_arch: TargetArch,
    /// Toolchain version identifier, e.g. `1.20.6`
    pub toolchain: String,
    /// Extra `KEY=VALUE` assignments overriding the project's
    pub env: String,
    /// Build automatically when a push to `branch` is received
    pub auto_build: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
