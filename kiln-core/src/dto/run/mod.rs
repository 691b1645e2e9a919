//! Run DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::run::{Run, RunStatus};

pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Run listing filter, newest first
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunFilter {
    pub project_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl RunFilter {
    pub fn for_task(task_id: Uuid) -> Self {
        Self {
            task_id: Some(task_id),
            ..Self::default()
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }
}

/// Run summary for listings and status reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: Uuid,
    pub task_id: Uuid,
    pub status: RunStatus,
    pub description: String,
    pub artifact_url: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<Run> for RunSummary {
    fn from(run: Run) -> Self {
        Self {
            id: run.id,
            task_id: run.task_id,
            status: run.status,
            description: run.description,
            artifact_url: run.artifact_url,
            created_at: run.created_at,
            finished_at: run.finished_at,
        }
    }
}
