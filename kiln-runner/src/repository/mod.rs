//! Repository layer
//!
//! The executor reports run progress through [`RunRepository`]; the
//! orchestrator's record stores implement it.

use async_trait::async_trait;
use kiln_core::domain::run::Run;

#[derive(Debug, thiserror::Error)]
#[error("failed to persist run: {0}")]
pub struct RepositoryError(pub String);

/// Persists the executor's view of a run
#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Overwrites the stored run with `run`
    async fn update_run(&self, run: &Run) -> Result<(), RepositoryError>;
}
