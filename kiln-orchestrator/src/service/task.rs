//! Task Service
//!
//! Business logic for task management. Every rule a run depends on is
//! checked here, so a stored task can always be launched.

use kiln_core::domain::platform::{TargetArch, TargetOs, UnsupportedTarget};
use kiln_core::domain::task::Task;
use kiln_core::dto::task::{CreateTask, TaskFilter};
use kiln_runner::layout;
use std::path::{Component, Path};
use uuid::Uuid;

use super::{AppState, Result, ServiceError, project_service};

/// Create a new task for an existing project
pub async fn create_task(state: &AppState, req: CreateTask) -> Result<Task> {
    project_service::get_project(state, req.project_id).await?;

    let task = build_task(req)?;
    state.toolchains.path(&task.toolchain)?;

    state.store.insert_task(&task).await?;

    tracing::info!(
        "Task created: {} ({} {}/{} with go{})",
        task.id,
        task.branch,
        task.target_os,
        task.target_arch,
        task.toolchain
    );
    Ok(task)
}

pub async fn get_task(state: &AppState, id: Uuid) -> Result<Task> {
    state
        .store
        .get_task(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("task {}", id)))
}

pub async fn list_tasks(state: &AppState, filter: &TaskFilter) -> Result<Vec<Task>> {
    Ok(state.store.list_tasks(filter).await?)
}

/// Toggle whether pushes to the task's branch trigger a run
pub async fn set_auto_build(state: &AppState, id: Uuid, auto_build: bool) -> Result<Task> {
    if !state.store.set_auto_build(id, auto_build).await? {
        return Err(ServiceError::NotFound(format!("task {}", id)));
    }
    tracing::info!("Task {} auto-build set to {}", id, auto_build);
    get_task(state, id).await
}

/// Delete a task together with its runs
pub async fn delete_task(state: &AppState, id: Uuid) -> Result<()> {
    if !state.store.delete_task_with_runs(id).await? {
        return Err(ServiceError::NotFound(format!("task {}", id)));
    }
    tracing::info!("Task deleted: {}", id);
    Ok(())
}

// =============================================================================
// Validation
// =============================================================================

fn build_task(req: CreateTask) -> Result<Task> {
    let branch = required("branch", &req.branch)?;
    let main_file = required("main file", &req.main_file)?;
    let dest_file = required("destination file", &req.dest_file)?;
    let toolchain = required("toolchain", &req.toolchain)?;

    // Branch names become log and artifact directories
    if branch.starts_with('-') || !layout::stays_inside(&branch) {
        return Err(ServiceError::ConfigInvalid(format!(
            "branch '{}' is not a usable branch name",
            branch
        )));
    }

    if !is_relative_inside(Path::new(&main_file)) {
        return Err(ServiceError::ConfigInvalid(format!(
            "main file '{}' must be a relative path inside the project",
            main_file
        )));
    }

    let mut dest_components = Path::new(&dest_file).components();
    if !matches!(
        (dest_components.next(), dest_components.next()),
        (Some(Component::Normal(_)), None)
    ) {
        return Err(ServiceError::ConfigInvalid(format!(
            "destination file '{}' must be a plain file name",
            dest_file
        )));
    }

    Ok(Task {
        id: Uuid::new_v4(),
        project_id: req.project_id,
        branch,
        main_file,
        dest_file,
        target_os: target_os(req.target_os.as_deref())?,
        target_arch: target_arch(req.target_arch.as_deref())?,
        toolchain,
        env: req.env.unwrap_or_default(),
        auto_build: req.auto_build,
        created_at: chrono::Utc::now(),
    })
}

fn required(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ServiceError::ConfigInvalid(format!(
            "{} cannot be empty",
            field
        )));
    }
    Ok(value.to_string())
}

fn is_relative_inside(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Parses a requested OS, defaulting to the host when unset
fn target_os(requested: Option<&str>) -> Result<TargetOs> {
    match requested.map(str::trim).filter(|s| !s.is_empty()) {
        Some(os) => os
            .parse()
            .map_err(|e: UnsupportedTarget| ServiceError::ConfigInvalid(e.to_string())),
        None => TargetOs::host().ok_or_else(|| {
            ServiceError::ConfigInvalid(format!(
                "host OS {} is not a supported target, set target_os explicitly",
                std::env::consts::OS
            ))
        }),
    }
}

/// Parses a requested architecture, defaulting to the host when unset
fn target_arch(requested: Option<&str>) -> Result<TargetArch> {
    match requested.map(str::trim).filter(|s| !s.is_empty()) {
        Some(arch) => arch
            .parse()
            .map_err(|e: UnsupportedTarget| ServiceError::ConfigInvalid(e.to_string())),
        None => TargetArch::host().ok_or_else(|| {
            ServiceError::ConfigInvalid(format!(
                "host architecture {} is not a supported target, set target_arch explicitly",
                std::env::consts::ARCH
            ))
        }),
    }
}
