//! Toolchain Service

use super::{AppState, Result};

/// Installed toolchain versions, sorted
pub fn list_toolchains(state: &AppState) -> Result<Vec<String>> {
    Ok(state.toolchains.installed()?)
}
