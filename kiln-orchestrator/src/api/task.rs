//! Task API Handlers
//!
//! HTTP endpoints for task management and manual run triggering.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use kiln_core::domain::run::Run;
use kiln_core::domain::task::Task;
use kiln_core::dto::task::{CreateTask, SetAutoBuild, TaskFilter};
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::service::{AppState, run_service, task_service};

/// POST /task
pub async fn create_task(
    State(state): State<AppState>,
    Json(req): Json<CreateTask>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    tracing::info!("Creating task for project {}: {}", req.project_id, req.branch);

    let task = task_service::create_task(&state, req).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// GET /task/list
/// List tasks, optionally filtered by project and toolchain
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(filter): Query<TaskFilter>,
) -> ApiResult<Json<Vec<Task>>> {
    tracing::debug!("Listing tasks: {:?}", filter);

    let tasks = task_service::list_tasks(&state, &filter).await?;
    Ok(Json(tasks))
}

/// POST /task/{id}/auto-build
/// Toggle push-triggered builds
pub async fn set_auto_build(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SetAutoBuild>,
) -> ApiResult<Json<Task>> {
    let task = task_service::set_auto_build(&state, id, req.auto_build).await?;
    Ok(Json(task))
}

/// POST /task/{id}/start
/// Start a run; returns once the run record exists
pub async fn start_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<Run>)> {
    tracing::info!("Starting task: {}", id);

    let run = run_service::launch_run(&state, id).await?;
    Ok((StatusCode::ACCEPTED, Json(run)))
}

/// DELETE /task/{id}
/// Delete a task and all of its runs
pub async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    tracing::info!("Deleting task: {}", id);

    task_service::delete_task(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
