//! Run API Handlers
//!
//! HTTP endpoints for run status and captured output.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use kiln_core::domain::run::Run;
use kiln_core::dto::run::{RunFilter, RunSummary};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::service::run::OutputStream;
use crate::service::{AppState, run_service};

#[derive(Debug, Deserialize)]
pub struct OutputQuery {
    #[serde(default)]
    pub stream: OutputStream,
}

/// GET /run/list
/// List runs newest first, filtered by project or task
pub async fn list_runs(
    State(state): State<AppState>,
    Query(filter): Query<RunFilter>,
) -> ApiResult<Json<Vec<RunSummary>>> {
    tracing::debug!("Listing runs: {:?}", filter);

    let runs = run_service::list_runs(&state, &filter).await?;
    Ok(Json(runs.into_iter().map(RunSummary::from).collect()))
}

/// GET /run/{id}
pub async fn get_run(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Run>> {
    tracing::debug!("Getting run: {}", id);

    let run = run_service::get_run(&state, id).await?;
    Ok(Json(run))
}

/// GET /run/{id}/output?stream=out|err
/// Captured stdout (default) or stderr of a run
pub async fn get_output(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<OutputQuery>,
) -> ApiResult<String> {
    tracing::debug!("Reading {:?} output of run: {}", query.stream, id);

    let output = run_service::read_output(&state, id, query.stream).await?;
    Ok(output)
}
