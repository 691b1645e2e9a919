//! Run domain types
//!
//! A run is one executed attempt of a task. Its status only ever moves
//! forward:
//!
//! ```text
//! Init ──► Running ──► Success
//!   │         │
//!   └─────────┴──────► Failed
//! ```
//!
//! `Init → Failed` covers pre-build failures (log sinks, source sync) so
//! they stay distinguishable from compile failures, which always pass
//! through `Running`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Run execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    Init,
    Running,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Init => "Init",
            RunStatus::Running => "Running",
            RunStatus::Success => "Success",
            RunStatus::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Success | RunStatus::Failed)
    }

    /// Whether `self → next` is a legal transition
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::Init, RunStatus::Running)
                | (RunStatus::Init, RunStatus::Failed)
                | (RunStatus::Running, RunStatus::Success)
                | (RunStatus::Running, RunStatus::Failed)
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Init" => Ok(RunStatus::Init),
            "Running" => Ok(RunStatus::Running),
            "Success" => Ok(RunStatus::Success),
            "Failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status '{}'", other)),
        }
    }
}

/// Rejected status change
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid run transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: RunStatus,
    pub to: RunStatus,
}

/// Run execution record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub task_id: Uuid,
    /// Summary of the commit that was built, filled in after source sync
    pub description: String,
    pub status: RunStatus,
    pub stdout_path: Option<PathBuf>,
    pub stderr_path: Option<PathBuf>,
    /// Where the artifact can be downloaded, once published
    pub artifact_url: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Run {
    /// A fresh run in `Init`
    pub fn new(task_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            description: String::new(),
            status: RunStatus::Init,
            stdout_path: None,
            stderr_path: None,
            artifact_url: None,
            created_at: chrono::Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Moves the run to `Running`
    pub fn start(&mut self) -> Result<(), InvalidTransition> {
        self.transition(RunStatus::Running)?;
        self.started_at = Some(chrono::Utc::now());
        Ok(())
    }

    /// Moves the run to a terminal status
    pub fn finish(&mut self, status: RunStatus) -> Result<(), InvalidTransition> {
        if !status.is_terminal() {
            return Err(InvalidTransition {
                from: self.status,
                to: status,
            });
        }
        self.transition(status)?;
        self.finished_at = Some(chrono::Utc::now());
        Ok(())
    }

    /// Assigns both log paths. Paths are set exactly once per run.
    pub fn assign_logs(&mut self, stdout: PathBuf, stderr: PathBuf) -> bool {
        if self.stdout_path.is_some() || self.stderr_path.is_some() {
            return false;
        }
        self.stdout_path = Some(stdout);
        self.stderr_path = Some(stderr);
        true
    }

    fn transition(&mut self, next: RunStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_run_starts_in_init() {
        let run = Run::new(Uuid::new_v4());
        assert_eq!(run.status, RunStatus::Init);
        assert!(run.started_at.is_none());
        assert!(run.finished_at.is_none());
    }

    #[test]
    fn test_full_successful_lifecycle() {
        let mut run = Run::new(Uuid::new_v4());
        run.start().unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.started_at.is_some());

        run.finish(RunStatus::Success).unwrap();
        assert_eq!(run.status, RunStatus::Success);
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn test_prebuild_failure_skips_running() {
        let mut run = Run::new(Uuid::new_v4());
        run.finish(RunStatus::Failed).unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.started_at.is_none());
    }

    #[test]
    fn test_init_cannot_jump_to_success() {
        let mut run = Run::new(Uuid::new_v4());
        let err = run.finish(RunStatus::Success).unwrap_err();
        assert_eq!(err.from, RunStatus::Init);
        assert_eq!(err.to, RunStatus::Success);
        assert_eq!(run.status, RunStatus::Init);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut run = Run::new(Uuid::new_v4());
        run.start().unwrap();
        run.finish(RunStatus::Failed).unwrap();

        assert!(run.start().is_err());
        assert!(run.finish(RunStatus::Success).is_err());
        assert!(run.finish(RunStatus::Failed).is_err());
        assert_eq!(run.status, RunStatus::Failed);
    }

    #[test]
    fn test_finish_rejects_transient_status() {
        let mut run = Run::new(Uuid::new_v4());
        run.start().unwrap();
        assert!(run.finish(RunStatus::Running).is_err());
        assert!(run.finish(RunStatus::Init).is_err());
    }

    #[test]
    fn test_running_twice_is_rejected() {
        let mut run = Run::new(Uuid::new_v4());
        run.start().unwrap();
        assert!(run.start().is_err());
    }

    #[test]
    fn test_log_paths_assigned_once() {
        let mut run = Run::new(Uuid::new_v4());
        assert!(run.assign_logs("a.out.log".into(), "a.err.log".into()));
        assert!(!run.assign_logs("b.out.log".into(), "b.err.log".into()));
        assert_eq!(run.stdout_path, Some(PathBuf::from("a.out.log")));
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in [
            RunStatus::Init,
            RunStatus::Running,
            RunStatus::Success,
            RunStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<RunStatus>(), Ok(status));
        }
        assert!("Queued".parse::<RunStatus>().is_err());
    }
}
