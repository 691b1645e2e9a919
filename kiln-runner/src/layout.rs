//! Deterministic on-disk and published locations
//!
//! - artifact: `<output>/<project>/<branch>/<dest>`
//! - logs:     `<record>/<project>/<branch>/<dest>.<run-id>.{out,err}.log`
//! - URL:      `http://<host>:<port>/output/<project>/<branch>/<dest>`

use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

use crate::config::RunnerConfig;

/// URL prefix under which the output directory is served
pub const OUTPUT_ROUTE: &str = "/output";

/// Whether `value` can be joined under a root without leaving it
///
/// Every component must be a plain name: no root, no `.` or `..`.
pub fn stays_inside(value: &str) -> bool {
    !value.is_empty()
        && Path::new(value)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

#[derive(Debug, Clone)]
pub struct Layout {
    output_dir: PathBuf,
    record_dir: PathBuf,
    public_host: String,
    port: u16,
}

/// Stdout and stderr log locations for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPaths {
    pub stdout: PathBuf,
    pub stderr: PathBuf,
}

impl Layout {
    pub fn new(config: &RunnerConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            record_dir: config.record_dir.clone(),
            public_host: config.public_host.clone(),
            port: config.port,
        }
    }

    pub fn artifact_path(&self, project: &str, branch: &str, dest_file: &str) -> PathBuf {
        self.output_dir.join(project).join(branch).join(dest_file)
    }

    pub fn log_paths(&self, project: &str, branch: &str, dest_file: &str, run_id: Uuid) -> LogPaths {
        let dir = self.record_dir.join(project).join(branch);
        LogPaths {
            stdout: dir.join(format!("{}.{}.out.log", dest_file, run_id)),
            stderr: dir.join(format!("{}.{}.err.log", dest_file, run_id)),
        }
    }

    pub fn publish_url(&self, project: &str, branch: &str, dest_file: &str) -> String {
        format!(
            "http://{}:{}{}/{}/{}/{}",
            self.public_host, self.port, OUTPUT_ROUTE, project, branch, dest_file
        )
    }
}
