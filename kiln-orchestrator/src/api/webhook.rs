//! Webhook API Handler
//!
//! Accepts push events and starts the matching auto-build tasks.

use axum::{
    Json,
    extract::{Path, State},
};
use kiln_core::dto::run::RunSummary;
use kiln_core::dto::webhook::PushEvent;

use crate::api::error::{ApiError, ApiResult};
use crate::service::{AppState, run_service};

/// POST /webhook/{project}
pub async fn push(
    State(state): State<AppState>,
    Path(project): Path<String>,
    Json(event): Json<PushEvent>,
) -> ApiResult<Json<Vec<RunSummary>>> {
    if !event.is_push() {
        return Err(ApiError::BadRequest(format!(
            "unsupported event kind '{}'",
            event.object_kind
        )));
    }

    let branch = event
        .branch()
        .ok_or_else(|| ApiError::BadRequest(format!("ref '{}' is not a branch", event.git_ref)))?;

    tracing::info!("Push to {} on {}", project, branch);
    let runs = run_service::trigger_push(&state, &project, branch).await?;
    Ok(Json(runs.into_iter().map(RunSummary::from).collect()))
}
