//! Repository Module
//!
//! Data access layer for the orchestrator. [`RecordStore`] is the seam the
//! services talk to; [`PgStore`] keeps records in Postgres and
//! [`MemoryStore`] keeps them in process memory.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use kiln_core::domain::project::Project;
use kiln_core::domain::run::Run;
use kiln_core::domain::task::Task;
use kiln_core::dto::project::ProjectFilter;
use kiln_core::dto::run::RunFilter;
use kiln_core::dto::task::TaskFilter;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Persistent storage for projects, tasks and runs
///
/// `get_*` return `None` for unknown ids; `delete_*`, `set_auto_build` and
/// `update_run` report whether a record was affected.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fails with `Conflict` when the name or local path is taken
    async fn insert_project(&self, project: &Project) -> Result<()>;
    async fn get_project(&self, id: Uuid) -> Result<Option<Project>>;
    async fn find_project_by_name(&self, name: &str) -> Result<Option<Project>>;
    /// Projects whose name contains the filter (case-insensitive), by name
    async fn list_projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>>;
    async fn delete_project(&self, id: Uuid) -> Result<bool>;

    async fn insert_task(&self, task: &Task) -> Result<()>;
    async fn get_task(&self, id: Uuid) -> Result<Option<Task>>;
    /// Tasks matching the filter, newest first
    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>>;
    async fn set_auto_build(&self, id: Uuid, auto_build: bool) -> Result<bool>;
    /// Deletes the task and all of its runs atomically
    async fn delete_task_with_runs(&self, id: Uuid) -> Result<bool>;

    async fn insert_run(&self, run: &Run) -> Result<()>;
    async fn get_run(&self, id: Uuid) -> Result<Option<Run>>;
    async fn update_run(&self, run: &Run) -> Result<bool>;
    /// Runs matching the filter, newest first, paginated
    async fn list_runs(&self, filter: &RunFilter) -> Result<Vec<Run>>;
}
