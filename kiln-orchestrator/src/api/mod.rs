//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod health;
pub mod project;
pub mod run;
pub mod task;
pub mod toolchain;
pub mod webhook;

use axum::{
    Router,
    routing::{delete, get, post},
};
use kiln_runner::layout::OUTPUT_ROUTE;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::service::AppState;

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let artifacts = ServeDir::new(&state.config.output_dir);

    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Project endpoints
        .route("/project", post(project::create_project))
        .route("/project/list", get(project::list_projects))
        .route("/project/{id}", get(project::get_project))
        .route("/project/{id}", delete(project::delete_project))
        .route("/project/{id}/branches", get(project::list_branches))
        // Task endpoints
        .route("/task", post(task::create_task))
        .route("/task/list", get(task::list_tasks))
        .route("/task/{id}", delete(task::delete_task))
        .route("/task/{id}/auto-build", post(task::set_auto_build))
        .route("/task/{id}/start", post(task::start_task))
        // Run endpoints
        .route("/run/list", get(run::list_runs))
        .route("/run/{id}", get(run::get_run))
        .route("/run/{id}/output", get(run::get_output))
        // Webhook and toolchain endpoints
        .route("/webhook/{project}", post(webhook::push))
        .route("/toolchain/list", get(toolchain::list_toolchains))
        // Published artifacts
        .nest_service(OUTPUT_ROUTE, artifacts)
        // Add state and middleware
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
