//! Service test fixtures: an in-memory store, a scripted source
//! synchronizer and a shell script standing in for the compiler

use async_trait::async_trait;
use kiln_core::dto::project::CreateProject;
use kiln_core::dto::task::CreateTask;
use kiln_runner::config::RunnerConfig;
use kiln_runner::source::{CommitSummary, SourceSynchronizer, SyncError};
use kiln_runner::toolchain::InstalledToolchains;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use uuid::Uuid;

use super::AppState;
use crate::repository::MemoryStore;

const FAKE_GO: &str = r#"#!/bin/sh
out=""
while [ $# -gt 0 ]; do
    case "$1" in
        -o) out="$2"; shift 2 ;;
        *) shift ;;
    esac
done
echo "compiling $out for $GOOS/$GOARCH"
printf 'binary' > "$out"
"#;

/// Synchronizer that creates the working copy directory and reports a
/// fixed commit
pub struct StubSource {
    commit: CommitSummary,
    synced: Mutex<Vec<(PathBuf, String)>>,
    next_failure: Mutex<Option<SyncError>>,
}

impl StubSource {
    fn new() -> Self {
        Self {
            commit: CommitSummary {
                id: "3f2a9c1d7e8b4a6f5c0d2e1b9a8f7c6d5e4b3a21".to_string(),
                subject: "Bump dependencies".to_string(),
            },
            synced: Mutex::new(Vec::new()),
            next_failure: Mutex::new(None),
        }
    }

    pub fn commit(&self) -> CommitSummary {
        self.commit.clone()
    }

    /// Working copies and branches synchronized so far
    pub fn synced(&self) -> Vec<(PathBuf, String)> {
        self.synced.lock().unwrap().clone()
    }

    /// Makes the next `ensure` call fail with `err`
    pub fn fail_next(&self, err: SyncError) {
        *self.next_failure.lock().unwrap() = Some(err);
    }
}

#[async_trait]
impl SourceSynchronizer for StubSource {
    async fn ensure(
        &self,
        path: &Path,
        _remote_url: &str,
        branch: &str,
        _credential: Option<&str>,
    ) -> Result<CommitSummary, SyncError> {
        self.synced
            .lock()
            .unwrap()
            .push((path.to_path_buf(), branch.to_string()));
        if let Some(err) = self.next_failure.lock().unwrap().take() {
            return Err(err);
        }
        tokio::fs::create_dir_all(path).await?;
        Ok(self.commit.clone())
    }

    async fn branches(
        &self,
        _remote_url: &str,
        _credential: Option<&str>,
    ) -> Result<Vec<String>, SyncError> {
        Ok(vec!["develop".to_string(), "master".to_string()])
    }
}

pub struct Fixture {
    temp: TempDir,
    pub state: AppState,
    pub source: Arc<StubSource>,
}

impl Fixture {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let config = RunnerConfig::new(temp.path().join("data"));
        install_fake_toolchain(&config.toolchain_dir.join("go1.20.6"));

        let source = Arc::new(StubSource::new());
        let toolchains = Arc::new(InstalledToolchains::new(&config.toolchain_dir));
        let state = AppState::new(config, Arc::new(MemoryStore::new()), source.clone(), toolchains);

        Self {
            temp,
            state,
            source,
        }
    }

    pub fn checkout(&self, name: &str) -> PathBuf {
        self.temp.path().join("checkouts").join(name)
    }

    pub fn create_project(&self, name: &str) -> CreateProject {
        CreateProject {
            name: name.to_string(),
            url: format!("https://git.example.com/team/{}.git", name),
            token: None,
            local_path: self.checkout(name).display().to_string(),
            main_branch: None,
            module_mode: true,
            workspace: None,
            env: None,
            before_build: None,
            after_build: None,
        }
    }

    pub fn create_task(&self, project_id: Uuid, branch: &str) -> CreateTask {
        CreateTask {
            project_id,
            branch: branch.to_string(),
            main_file: "cmd/app/main.go".to_string(),
            dest_file: "app".to_string(),
            target_os: None,
            target_arch: None,
            toolchain: "1.20.6".to_string(),
            env: None,
            auto_build: false,
        }
    }

    pub fn remove_toolchain(&self) {
        std::fs::remove_dir_all(self.state.config.toolchain_dir.join("go1.20.6")).unwrap();
    }
}

fn install_fake_toolchain(root: &Path) {
    let bin = root.join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    let go = bin.join("go");
    std::fs::write(&go, FAKE_GO).unwrap();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&go, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
}
