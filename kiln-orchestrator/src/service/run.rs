//! Run Service
//!
//! Creates runs and hands them to the build executor. Launching returns as
//! soon as the run record exists; the build continues on a detached task.

use kiln_core::domain::project::Project;
use kiln_core::domain::run::Run;
use kiln_core::domain::task::Task;
use kiln_core::dto::run::RunFilter;
use kiln_core::dto::task::TaskFilter;
use kiln_runner::execution::BuildJob;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AppState, Result, ServiceError, project_service, task_service};

/// Which captured log of a run to read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    #[default]
    Out,
    Err,
}

/// Manually start a run of a task
pub async fn launch_run(state: &AppState, task_id: Uuid) -> Result<Run> {
    let task = task_service::get_task(state, task_id).await?;
    let project = project_service::get_project(state, task.project_id).await?;
    launch(state, project, task).await
}

/// Start a run of every auto-build task tracking `branch` of the project
pub async fn trigger_push(state: &AppState, project_name: &str, branch: &str) -> Result<Vec<Run>> {
    let project = state
        .store
        .find_project_by_name(project_name)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("project {}", project_name)))?;

    let tasks = state
        .store
        .list_tasks(&TaskFilter {
            project_id: Some(project.id),
            toolchain: None,
        })
        .await?;

    let mut runs = Vec::new();
    for task in tasks
        .into_iter()
        .filter(|t| t.auto_build && t.branch == branch)
    {
        let task_id = task.id;
        match launch(state, project.clone(), task).await {
            Ok(run) => runs.push(run),
            Err(ServiceError::ConfigInvalid(reason)) => {
                tracing::warn!("Skipping auto-build of task {}: {}", task_id, reason);
            }
            Err(e) => return Err(e),
        }
    }

    tracing::info!(
        "Push to {} {} triggered {} run(s)",
        project.name,
        branch,
        runs.len()
    );
    Ok(runs)
}

pub async fn get_run(state: &AppState, id: Uuid) -> Result<Run> {
    state
        .store
        .get_run(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("run {}", id)))
}

pub async fn list_runs(state: &AppState, filter: &RunFilter) -> Result<Vec<Run>> {
    Ok(state.store.list_runs(filter).await?)
}

/// Contents of a run's captured stdout or stderr log
pub async fn read_output(state: &AppState, id: Uuid, stream: OutputStream) -> Result<String> {
    let run = get_run(state, id).await?;
    let path = match stream {
        OutputStream::Out => run.stdout_path,
        OutputStream::Err => run.stderr_path,
    }
    .ok_or_else(|| ServiceError::NotFound(format!("output of run {}", id)))?;

    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ServiceError::NotFound(format!("output of run {}", id)))
        }
        Err(e) => Err(e.into()),
    }
}

async fn launch(state: &AppState, project: Project, task: Task) -> Result<Run> {
    // Fail before a run exists rather than inside it
    state.toolchains.path(&task.toolchain)?;

    let run = Run::new(task.id);
    state.store.insert_run(&run).await?;

    tracing::info!("Run {} created for task {}", run.id, task.id);
    state.executor.spawn(BuildJob {
        run: run.clone(),
        project,
        task,
    });

    Ok(run)
}
