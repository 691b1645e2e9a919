//! Project API Handlers
//!
//! HTTP endpoints for project registration and inspection.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use kiln_core::domain::project::Project;
use kiln_core::dto::project::{CreateProject, ProjectFilter};
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::service::{AppState, project_service};

/// POST /project
/// Register a project and clone its main branch
pub async fn create_project(
    State(state): State<AppState>,
    Json(req): Json<CreateProject>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    tracing::info!("Registering project: {}", req.name);

    let project = project_service::register_project(&state, req).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

/// GET /project/list
/// List projects, optionally filtered by name
pub async fn list_projects(
    State(state): State<AppState>,
    Query(filter): Query<ProjectFilter>,
) -> ApiResult<Json<Vec<Project>>> {
    tracing::debug!("Listing projects: {:?}", filter);

    let projects = project_service::list_projects(&state, &filter).await?;
    Ok(Json(projects))
}

/// GET /project/{id}
pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Project>> {
    tracing::debug!("Getting project: {}", id);

    let project = project_service::get_project(&state, id).await?;
    Ok(Json(project))
}

/// GET /project/{id}/branches
/// List branches of the project's remote
pub async fn list_branches(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<String>>> {
    tracing::debug!("Listing branches of project: {}", id);

    let branches = project_service::list_branches(&state, id).await?;
    Ok(Json(branches))
}

/// DELETE /project/{id}
pub async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    tracing::info!("Deleting project: {}", id);

    project_service::delete_project(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
