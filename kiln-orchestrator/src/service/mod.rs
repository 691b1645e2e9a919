//! Service Module
//!
//! Business logic layer for the orchestrator.
//! Services orchestrate between the record store, the source synchronizer
//! and the build executor, and contain the validation rules.

pub mod project;
pub mod run;
pub mod task;
pub mod toolchain;

#[cfg(test)]
pub(crate) mod testing;

use kiln_runner::config::RunnerConfig;
use kiln_runner::execution::BuildExecutor;
use kiln_runner::repository::RunRepository;
use kiln_runner::source::{SourceSynchronizer, SyncError};
use kiln_runner::toolchain::{ToolchainError, ToolchainResolver};
use std::sync::Arc;

use crate::repository::{RecordStore, StoreError};

// Re-export for convenience
pub use project as project_service;
pub use run as run_service;
pub use task as task_service;
pub use toolchain as toolchain_service;

/// Shared dependencies of every service call
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub executor: Arc<BuildExecutor>,
    pub source: Arc<dyn SourceSynchronizer>,
    pub toolchains: Arc<dyn ToolchainResolver>,
    pub config: Arc<RunnerConfig>,
}

impl AppState {
    /// Wires the services around one store that also records run progress
    pub fn new<S>(
        config: RunnerConfig,
        store: Arc<S>,
        source: Arc<dyn SourceSynchronizer>,
        toolchains: Arc<dyn ToolchainResolver>,
    ) -> Self
    where
        S: RecordStore + RunRepository + 'static,
    {
        let runs: Arc<dyn RunRepository> = store.clone();
        let executor = BuildExecutor::new(&config, source.clone(), toolchains.clone(), runs);
        Self {
            store,
            executor: Arc::new(executor),
            source,
            toolchains,
            config: Arc::new(config),
        }
    }
}

/// Service error type
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The request cannot be acted on as given
    #[error("{0}")]
    ConfigInvalid(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Source(#[from] SyncError),

    #[error(transparent)]
    Persistence(StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => ServiceError::Conflict(msg),
            other => ServiceError::Persistence(other),
        }
    }
}

impl From<ToolchainError> for ServiceError {
    fn from(err: ToolchainError) -> Self {
        match err {
            ToolchainError::Io(e) => ServiceError::Io(e),
            other => ServiceError::ConfigInvalid(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
