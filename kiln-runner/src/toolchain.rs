//! Toolchain resolution
//!
//! Installing toolchains is someone else's job; the runner only needs to
//! turn a version identifier into the root directory of an installed one.

use std::path::PathBuf;
use tracing::debug;

const DIR_PREFIX: &str = "go";

#[derive(Debug, thiserror::Error)]
pub enum ToolchainError {
    #[error("toolchain {version} is not installed (looked in {path})")]
    NotInstalled { version: String, path: PathBuf },

    #[error("invalid toolchain version '{0}'")]
    InvalidVersion(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolves toolchain versions to installed root directories
pub trait ToolchainResolver: Send + Sync {
    /// Absolute root directory of the installed toolchain
    fn path(&self, version: &str) -> Result<PathBuf, ToolchainError>;

    /// Installed versions, sorted
    fn installed(&self) -> Result<Vec<String>, ToolchainError>;
}

/// Toolchains unpacked side by side under one directory
///
/// Version `1.20.6` (or `go1.20.6`) lives in `<root>/go1.20.6`.
pub struct InstalledToolchains {
    root: PathBuf,
}

impl InstalledToolchains {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn dir_name(version: &str) -> Result<String, ToolchainError> {
        let version = version.trim();
        let bare = version.strip_prefix(DIR_PREFIX).unwrap_or(version);
        if bare.is_empty()
            || bare.contains(['/', '\\'])
            || bare.contains("..")
            || !bare.starts_with(|c: char| c.is_ascii_digit())
        {
            return Err(ToolchainError::InvalidVersion(version.to_string()));
        }
        Ok(format!("{}{}", DIR_PREFIX, bare))
    }
}

impl ToolchainResolver for InstalledToolchains {
    fn path(&self, version: &str) -> Result<PathBuf, ToolchainError> {
        let path = self.root.join(Self::dir_name(version)?);
        if !path.is_dir() {
            return Err(ToolchainError::NotInstalled {
                version: version.to_string(),
                path,
            });
        }
        debug!("Resolved toolchain {} to {}", version, path.display());
        Ok(std::path::absolute(&path)?)
    }

    fn installed(&self) -> Result<Vec<String>, ToolchainError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut versions = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let version = name
                .to_str()
                .and_then(|name| name.strip_prefix(DIR_PREFIX))
                .filter(|v| v.starts_with(|c: char| c.is_ascii_digit()));
            if let Some(version) = version {
                versions.push(version.to_string());
            }
        }
        versions.sort();
        Ok(versions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_installed_version() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("go1.20.6")).unwrap();
        let toolchains = InstalledToolchains::new(temp.path());

        let path = toolchains.path("1.20.6").unwrap();
        assert!(path.ends_with("go1.20.6"));
        assert!(path.is_absolute());

        // The prefixed spelling resolves to the same directory
        assert_eq!(toolchains.path("go1.20.6").unwrap(), path);
    }

    #[test]
    fn test_missing_version() {
        let temp = TempDir::new().unwrap();
        let toolchains = InstalledToolchains::new(temp.path());
        assert!(matches!(
            toolchains.path("1.21.0"),
            Err(ToolchainError::NotInstalled { .. })
        ));
    }

    #[test]
    fn test_rejects_path_like_versions() {
        let temp = TempDir::new().unwrap();
        let toolchains = InstalledToolchains::new(temp.path());
        for bad in ["", "../etc", "1.20/../../x", "latest"] {
            assert!(
                matches!(toolchains.path(bad), Err(ToolchainError::InvalidVersion(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_list_installed() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("go1.21.0")).unwrap();
        std::fs::create_dir(temp.path().join("go1.20.6")).unwrap();
        std::fs::create_dir(temp.path().join("dl")).unwrap();
        std::fs::write(temp.path().join("go1.19.tar.gz"), b"").unwrap();

        let toolchains = InstalledToolchains::new(temp.path());
        assert_eq!(toolchains.installed().unwrap(), vec!["1.20.6", "1.21.0"]);
    }
}
