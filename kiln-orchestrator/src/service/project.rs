//! Project Service
//!
//! Business logic for project registration and removal.

use kiln_core::domain::project::Project;
use kiln_core::dto::project::{CreateProject, ProjectFilter};
use kiln_core::dto::task::TaskFilter;
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

use super::{AppState, Result, ServiceError};

const NAME_PATTERN: &str = r"^[0-9A-Za-z_-]{1,30}$";
const DEFAULT_MAIN_BRANCH: &str = "master";

/// Registers a project and performs the first clone of its main branch
pub async fn register_project(state: &AppState, req: CreateProject) -> Result<Project> {
    let project = build_project(state, req)?;

    if state.store.find_project_by_name(&project.name).await?.is_some() {
        return Err(ServiceError::Conflict(format!(
            "project {} already exists",
            project.name
        )));
    }

    if tokio::fs::try_exists(&project.local_path).await? {
        return Err(ServiceError::ConfigInvalid(format!(
            "local path {} already exists",
            project.local_path.display()
        )));
    }

    for other in state.store.list_projects(&ProjectFilter::default()).await? {
        if paths_overlap(&other.local_path, &project.local_path) {
            return Err(ServiceError::Conflict(format!(
                "local path {} overlaps project {}",
                project.local_path.display(),
                other.name
            )));
        }
    }

    tracing::info!(
        "Cloning {} branch {} into {}",
        project.name,
        project.main_branch,
        project.local_path.display()
    );
    if let Err(e) = state
        .source
        .ensure(
            &project.local_path,
            &project.url,
            &project.main_branch,
            project.token.as_deref(),
        )
        .await
    {
        remove_working_copy(&project.local_path).await;
        return Err(e.into());
    }

    if let Err(e) = state.store.insert_project(&project).await {
        remove_working_copy(&project.local_path).await;
        return Err(e.into());
    }

    tracing::info!("Project registered: {} ({})", project.name, project.id);
    Ok(project)
}

pub async fn get_project(state: &AppState, id: Uuid) -> Result<Project> {
    state
        .store
        .get_project(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("project {}", id)))
}

pub async fn list_projects(state: &AppState, filter: &ProjectFilter) -> Result<Vec<Project>> {
    Ok(state.store.list_projects(filter).await?)
}

/// Branches available on the project's remote
pub async fn list_branches(state: &AppState, id: Uuid) -> Result<Vec<String>> {
    let project = get_project(state, id).await?;
    Ok(state
        .source
        .branches(&project.url, project.token.as_deref())
        .await?)
}

/// Deletes a project without tasks and removes its working copy
pub async fn delete_project(state: &AppState, id: Uuid) -> Result<()> {
    let project = get_project(state, id).await?;

    let tasks = state
        .store
        .list_tasks(&TaskFilter {
            project_id: Some(id),
            toolchain: None,
        })
        .await?;
    if !tasks.is_empty() {
        return Err(ServiceError::Conflict(format!(
            "project {} still has {} task(s)",
            project.name,
            tasks.len()
        )));
    }

    if !state.store.delete_project(id).await? {
        return Err(ServiceError::NotFound(format!("project {}", id)));
    }

    if tokio::fs::try_exists(&project.local_path).await? {
        tokio::fs::remove_dir_all(&project.local_path).await?;
    }

    tracing::info!("Project deleted: {} ({})", project.name, id);
    Ok(())
}

// =============================================================================
// Validation
// =============================================================================

fn build_project(state: &AppState, req: CreateProject) -> Result<Project> {
    let name_pattern =
        Regex::new(NAME_PATTERN).map_err(|e| ServiceError::ConfigInvalid(e.to_string()))?;
    if !name_pattern.is_match(&req.name) {
        return Err(ServiceError::ConfigInvalid(format!(
            "project name '{}' must be 1-30 letters, digits, '_' or '-'",
            req.name
        )));
    }

    if req.url.trim().is_empty() {
        return Err(ServiceError::ConfigInvalid(
            "project url cannot be empty".to_string(),
        ));
    }

    let local_path = normalize(Path::new(req.local_path.trim()));
    if !local_path.is_absolute() {
        return Err(ServiceError::ConfigInvalid(format!(
            "local path '{}' must be absolute",
            req.local_path
        )));
    }

    let main_branch = req
        .main_branch
        .map(|b| b.trim().to_string())
        .filter(|b| !b.is_empty())
        .unwrap_or_else(|| DEFAULT_MAIN_BRANCH.to_string());

    let workspace = match req.workspace.as_deref().map(str::trim) {
        Some(workspace) if !workspace.is_empty() => normalize(Path::new(workspace)),
        _ if req.module_mode => state.config.default_workspace.clone(),
        _ => {
            return Err(ServiceError::ConfigInvalid(
                "workspace is required when module mode is off".to_string(),
            ));
        }
    };
    if !req.module_mode && !workspace.is_absolute() {
        return Err(ServiceError::ConfigInvalid(format!(
            "workspace '{}' must be absolute",
            workspace.display()
        )));
    }

    Ok(Project {
        id: Uuid::new_v4(),
        name: req.name,
        url: req.url.trim().to_string(),
        token: req.token.filter(|t| !t.is_empty()),
        local_path,
        main_branch,
        module_mode: req.module_mode,
        workspace,
        env: req.env.unwrap_or_default(),
        before_build: req.before_build.filter(|s| !s.trim().is_empty()),
        after_build: req.after_build.filter(|s| !s.trim().is_empty()),
        created_at: chrono::Utc::now(),
    })
}

/// Lexically removes `.` and `..` components
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out
}

/// Whether one path equals or contains the other
fn paths_overlap(a: &Path, b: &Path) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

async fn remove_working_copy(path: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}
