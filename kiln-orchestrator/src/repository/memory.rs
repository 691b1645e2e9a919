//! In-memory Record Store
//!
//! Used when no database is configured, and by tests. Records are lost on
//! restart.

use async_trait::async_trait;
use kiln_core::domain::project::Project;
use kiln_core::domain::run::Run;
use kiln_core::domain::task::Task;
use kiln_core::dto::project::ProjectFilter;
use kiln_core::dto::run::RunFilter;
use kiln_core::dto::task::TaskFilter;
use kiln_runner::repository::{RepositoryError, RunRepository};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{RecordStore, Result, StoreError};

#[derive(Default)]
struct Records {
    projects: HashMap<Uuid, Project>,
    tasks: HashMap<Uuid, Task>,
    runs: HashMap<Uuid, Run>,
}

#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_project(&self, project: &Project) -> Result<()> {
        let mut records = self.records.write().await;
        let taken = records
            .projects
            .values()
            .any(|p| p.name == project.name || p.local_path == project.local_path);
        if taken || records.projects.contains_key(&project.id) {
            return Err(StoreError::Conflict(format!(
                "project {} already exists",
                project.name
            )));
        }
        records.projects.insert(project.id, project.clone());
        Ok(())
    }

    async fn get_project(&self, id: Uuid) -> Result<Option<Project>> {
        Ok(self.records.read().await.projects.get(&id).cloned())
    }

    async fn find_project_by_name(&self, name: &str) -> Result<Option<Project>> {
        let records = self.records.read().await;
        Ok(records.projects.values().find(|p| p.name == name).cloned())
    }

    async fn list_projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>> {
        let needle = filter.name.as_deref().map(str::to_lowercase);
        let records = self.records.read().await;
        let mut projects: Vec<Project> = records
            .projects
            .values()
            .filter(|p| match &needle {
                Some(needle) => p.name.to_lowercase().contains(needle.as_str()),
                None => true,
            })
            .cloned()
            .collect();
        projects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(projects)
    }

    async fn delete_project(&self, id: Uuid) -> Result<bool> {
        let mut records = self.records.write().await;
        if records.tasks.values().any(|t| t.project_id == id) {
            return Err(StoreError::Conflict(format!("project {} still has tasks", id)));
        }
        Ok(records.projects.remove(&id).is_some())
    }

    async fn insert_task(&self, task: &Task) -> Result<()> {
        let mut records = self.records.write().await;
        if !records.projects.contains_key(&task.project_id) {
            return Err(StoreError::Conflict(format!(
                "project {} does not exist",
                task.project_id
            )));
        }
        if records.tasks.contains_key(&task.id) {
            return Err(StoreError::Conflict(format!("task {} already exists", task.id)));
        }
        records.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>> {
        Ok(self.records.read().await.tasks.get(&id).cloned())
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let records = self.records.read().await;
        let mut tasks: Vec<Task> = records
            .tasks
            .values()
            .filter(|t| filter.project_id.is_none_or(|id| t.project_id == id))
            .filter(|t| {
                filter
                    .toolchain
                    .as_deref()
                    .is_none_or(|toolchain| t.toolchain == toolchain)
            })
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }

    async fn set_auto_build(&self, id: Uuid, auto_build: bool) -> Result<bool> {
        let mut records = self.records.write().await;
        match records.tasks.get_mut(&id) {
            Some(task) => {
                task.auto_build = auto_build;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_task_with_runs(&self, id: Uuid) -> Result<bool> {
        let mut records = self.records.write().await;
        if records.tasks.remove(&id).is_none() {
            return Ok(false);
        }
        records.runs.retain(|_, run| run.task_id != id);
        Ok(true)
    }

    async fn insert_run(&self, run: &Run) -> Result<()> {
        let mut records = self.records.write().await;
        if !records.tasks.contains_key(&run.task_id) {
            return Err(StoreError::Conflict(format!(
                "task {} does not exist",
                run.task_id
            )));
        }
        if records.runs.contains_key(&run.id) {
            return Err(StoreError::Conflict(format!("run {} already exists", run.id)));
        }
        records.runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn get_run(&self, id: Uuid) -> Result<Option<Run>> {
        Ok(self.records.read().await.runs.get(&id).cloned())
    }

    async fn update_run(&self, run: &Run) -> Result<bool> {
        let mut records = self.records.write().await;
        match records.runs.get_mut(&run.id) {
            Some(stored) => {
                *stored = run.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_runs(&self, filter: &RunFilter) -> Result<Vec<Run>> {
        let records = self.records.read().await;
        let mut runs: Vec<&Run> = records
            .runs
            .values()
            .filter(|r| filter.task_id.is_none_or(|id| r.task_id == id))
            .filter(|r| {
                filter.project_id.is_none_or(|project_id| {
                    records
                        .tasks
                        .get(&r.task_id)
                        .is_some_and(|t| t.project_id == project_id)
                })
            })
            .collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(runs
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit() as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RunRepository for MemoryStore {
    async fn update_run(&self, run: &Run) -> std::result::Result<(), RepositoryError> {
        match RecordStore::update_run(self, run).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(RepositoryError(format!("run {} no longer exists", run.id))),
            Err(e) => Err(RepositoryError(e.to_string())),
        }
    }
}
