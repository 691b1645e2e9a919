//! Project domain types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// A registered source repository and its build-relevant configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    /// Unique, immutable after creation
    pub name: String,
    pub url: String,
    /// Access token for private remotes. Never serialized back to clients.
    #[serde(skip_serializing, default)]
    pub token: Option<String>,
    /// Absolute path of the local working copy
    pub local_path: PathBuf,
    pub main_branch: String,
    /// Module mode (`GO111MODULE=on`) vs. workspace mode
    pub module_mode: bool,
    /// GOPATH used for builds of this project
    pub workspace: PathBuf,
    /// Extra `KEY=VALUE` assignments, newline or semicolon delimited
    pub env: String,
    /// Shell script run before the compiler
    pub before_build: Option<String>,
    /// Shell script run after a successful compile
    pub after_build: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
