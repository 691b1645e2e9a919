use anyhow::Context;
use kiln_runner::source::GitSynchronizer;
use kiln_runner::toolchain::InstalledToolchains;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod db;
pub mod repository;
pub mod service;

use config::Config;
use repository::{MemoryStore, PgStore};
use service::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "kiln_orchestrator=debug,kiln_runner=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Kiln Orchestrator...");

    let mut config = Config::from_env();
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    for dir in [
        &config.runner.output_dir,
        &config.runner.record_dir,
        &config.runner.toolchain_dir,
        &config.runner.default_workspace,
    ] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    config.runner = config
        .runner
        .into_absolute()
        .context("Failed to resolve data directories")?;

    let source = Arc::new(GitSynchronizer::new(config.runner.sync_timeout));
    let toolchains = Arc::new(InstalledToolchains::new(&config.runner.toolchain_dir));

    let state = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to database...");
            let pool = db::create_pool(database_url)
                .await
                .context("Failed to create database pool")?;
            tracing::info!("Database connection pool created");

            db::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;

            AppState::new(
                config.runner.clone(),
                Arc::new(PgStore::new(pool)),
                source,
                toolchains,
            )
        }
        None => {
            tracing::warn!("DATABASE_URL not set, records are kept in memory");
            AppState::new(
                config.runner.clone(),
                Arc::new(MemoryStore::new()),
                source,
                toolchains,
            )
        }
    };

    // Build router with all API endpoints
    let app = api::create_router(state);

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}
