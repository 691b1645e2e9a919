//! External process execution
//!
//! Runs a command with an explicit working directory and environment,
//! streaming stdout and stderr into caller-provided sinks while the child
//! runs. Exit codes and stderr output are reported, never turned into
//! errors: deciding whether a build failed is the caller's business.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::env::Environment;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to launch {program}: {reason}")]
    LaunchFailed { program: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A command to run
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub work_dir: PathBuf,
    pub env: Environment,
    /// Kill the process when it runs longer than this
    pub timeout: Option<Duration>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>, work_dir: impl Into<PathBuf>, env: Environment) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            work_dir: work_dir.into(),
            env,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Command line for log output
    pub fn display(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// How a process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
    /// Exit code; `None` when the process was killed by a signal
    pub code: Option<i32>,
    /// Whether any bytes reached the stderr sink
    pub stderr_written: bool,
    /// Whether the process was killed for exceeding its timeout
    pub timed_out: bool,
}

/// Runs external commands and shell scripts
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    shell: String,
}

impl ProcessRunner {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    /// Runs `invocation` to completion
    ///
    /// `started` receives the child's pid as soon as it has been spawned.
    /// It is dropped without a value when the process could not be launched.
    pub async fn run<O, E>(
        &self,
        invocation: &Invocation,
        stdout: &mut O,
        stderr: &mut E,
        started: Option<oneshot::Sender<u32>>,
    ) -> Result<ExitReport, ProcessError>
    where
        O: AsyncWrite + Unpin + Send + ?Sized,
        E: AsyncWrite + Unpin + Send + ?Sized,
    {
        let program = invocation.program.display().to_string();

        if !is_dir(&invocation.work_dir).await {
            return Err(ProcessError::LaunchFailed {
                program,
                reason: format!(
                    "working directory {} does not exist",
                    invocation.work_dir.display()
                ),
            });
        }

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .current_dir(&invocation.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        invocation.env.apply(&mut command);

        debug!(
            "Spawning in {}: {}",
            invocation.work_dir.display(),
            invocation.display()
        );

        let mut child = command.spawn().map_err(|e| ProcessError::LaunchFailed {
            program: program.clone(),
            reason: e.to_string(),
        })?;

        if let Some(started) = started {
            let _ = started.send(child.id().unwrap_or_default());
        }

        let (mut child_out, mut child_err) = match (child.stdout.take(), child.stderr.take()) {
            (Some(out), Some(err)) => (out, err),
            _ => {
                let _ = child.kill().await;
                return Err(ProcessError::LaunchFailed {
                    program,
                    reason: "output pipes were not captured".to_string(),
                });
            }
        };

        let work = async {
            let (status, _, err_bytes) = tokio::try_join!(
                child.wait(),
                tokio::io::copy(&mut child_out, &mut *stdout),
                tokio::io::copy(&mut child_err, &mut *stderr),
            )?;
            Ok::<_, std::io::Error>((status, err_bytes))
        };

        let outcome = match invocation.timeout {
            Some(limit) => tokio::time::timeout(limit, work).await.ok(),
            None => Some(work.await),
        };

        let report = match outcome {
            Some(result) => {
                let (status, err_bytes) = result?;
                ExitReport {
                    code: status.code(),
                    stderr_written: err_bytes > 0,
                    timed_out: false,
                }
            }
            None => {
                warn!(
                    "{} exceeded its timeout of {:?}, killing it",
                    program,
                    invocation.timeout.unwrap_or_default()
                );
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill {}: {}", program, e);
                }
                ExitReport {
                    code: None,
                    stderr_written: false,
                    timed_out: true,
                }
            }
        };

        stdout.flush().await?;
        stderr.flush().await?;

        debug!("{} finished: {:?}", program, report);
        Ok(report)
    }

    /// Runs an opaque shell script through the configured shell
    pub async fn run_script<O, E>(
        &self,
        script: &str,
        work_dir: &Path,
        env: &Environment,
        timeout: Duration,
        stdout: &mut O,
        stderr: &mut E,
    ) -> Result<ExitReport, ProcessError>
    where
        O: AsyncWrite + Unpin + Send + ?Sized,
        E: AsyncWrite + Unpin + Send + ?Sized,
    {
        let invocation = Invocation::new(&self.shell, work_dir, env.clone())
            .arg("-c")
            .arg(script)
            .timeout(timeout);
        self.run(&invocation, stdout, stderr, None).await
    }
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
}
