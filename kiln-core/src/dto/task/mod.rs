//! Task DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request to create a task
///
/// Target OS/arch are kept as raw strings so that validation can default
/// empty values to the host and report disallowed ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTask {
    pub project_id: Uuid,
    pub branch: String,
    pub main_file: String,
    pub dest_file: String,
    #[serde(default)]
    pub target_os: Option<String>,
    #[serde(default)]
    pub target_arch: Option<String>,
    pub toolchain: String,
    #[serde(default)]
    pub env: Option<String>,
    #[serde(default)]
    pub auto_build: bool,
}

/// Toggle for the only mutable task field
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SetAutoBuild {
    pub auto_build: bool,
}

/// Task listing filter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilter {
    pub project_id: Option<Uuid>,
    pub toolchain: Option<String>,
}
