//! Webhook DTOs

use serde::{Deserialize, Serialize};

pub const KIND_PUSH: &str = "push";

/// Push notification from the source host (GitLab event shape)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEvent {
    pub object_kind: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
}

impl PushEvent {
    pub fn is_push(&self) -> bool {
        self.object_kind == KIND_PUSH
    }

    /// Branch name for `refs/heads/<branch>` refs; tags and others yield `None`
    pub fn branch(&self) -> Option<&str> {
        self.git_ref
            .strip_prefix("refs/heads/")
            .filter(|branch| !branch.is_empty())
    }
}
