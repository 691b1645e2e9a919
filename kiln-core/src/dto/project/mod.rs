//! Project DTOs

use serde::{Deserialize, Serialize};

/// Request to register a new project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProject {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub token: Option<String>,
    pub local_path: String,
    #[serde(default)]
    pub main_branch: Option<String>,
    #[serde(default)]
    pub module_mode: bool,
    /// Required when module mode is off
    #[serde(default)]
    pub workspace: Option<String>,
    #[serde(default)]
    pub env: Option<String>,
    #[serde(default)]
    pub before_build: Option<String>,
    #[serde(default)]
    pub after_build: Option<String>,
}

/// Project listing filter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectFilter {
    pub name: Option<String>,
}
