//! Toolchain API Handler

use axum::{Json, extract::State};

use crate::api::error::ApiResult;
use crate::service::{AppState, toolchain_service};

/// GET /toolchain/list
/// Installed toolchain versions
pub async fn list_toolchains(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    let versions = toolchain_service::list_toolchains(&state)?;
    Ok(Json(versions))
}
