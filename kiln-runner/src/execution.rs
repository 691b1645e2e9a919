//! Build execution
//!
//! [`BuildExecutor`] drives one run from `Init` to a terminal status:
//!
//! 1. assign and create the run's log files
//! 2. synchronize the project's working copy
//! 3. record the commit summary
//! 4. compose the build environment
//! 5. run the before-build script
//! 6. compile, moving to `Running` once the compiler is spawned
//! 7. run the after-build script
//! 8. verify and publish the artifact
//!
//! Every exit path, a panic included, ends in exactly one call to
//! [`Run::finish`]. Runs of the same project share one working copy, so
//! they are serialized; runs of different projects proceed in parallel.

use chrono::Utc;
use futures::FutureExt;
use kiln_core::domain::project::Project;
use kiln_core::domain::run::{Run, RunStatus};
use kiln_core::domain::task::Task;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::RunnerConfig;
use crate::env::{self, BuildEnv, Environment};
use crate::layout::{self, Layout, LogPaths};
use crate::process::{ExitReport, Invocation, ProcessError, ProcessRunner};
use crate::repository::RunRepository;
use crate::source::{SourceSynchronizer, SyncError};
use crate::toolchain::{ToolchainError, ToolchainResolver};

const PERSIST_ATTEMPTS: u32 = 3;
const PERSIST_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Toolchain(#[from] ToolchainError),

    #[error("{step} failed: {reason}")]
    BuildFailed { step: String, reason: String },

    #[error("log sink error: {0}")]
    LogSink(#[source] std::io::Error),

    #[error("{0} cannot be used as a directory name")]
    InvalidLayout(String),

    #[error("artifact {} was not produced", .0.display())]
    ArtifactMissing(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decides whether a finished process counts as a success
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildPolicy {
    /// Any stderr output fails the step, even with exit code 0
    pub fail_on_stderr: bool,
}

impl Default for BuildPolicy {
    fn default() -> Self {
        Self {
            fail_on_stderr: true,
        }
    }
}

impl BuildPolicy {
    pub fn check(&self, step: &str, report: &ExitReport) -> Result<(), BuildError> {
        let reason = if report.timed_out {
            Some("timed out".to_string())
        } else if report.code != Some(0) {
            Some(match report.code {
                Some(code) => format!("exited with code {}", code),
                None => "terminated by a signal".to_string(),
            })
        } else if self.fail_on_stderr && report.stderr_written {
            Some("wrote to stderr".to_string())
        } else {
            None
        };

        match reason {
            Some(reason) => Err(BuildError::BuildFailed {
                step: step.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

/// Everything needed to execute one run
#[derive(Debug, Clone)]
pub struct BuildJob {
    pub run: Run,
    pub project: Project,
    pub task: Task,
}

/// Open log files of a run
struct BuildLogs {
    out: File,
    err: File,
}

impl BuildLogs {
    async fn create(paths: &LogPaths) -> std::io::Result<Self> {
        for path in [&paths.stdout, &paths.stderr] {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        Ok(Self {
            out: File::create(&paths.stdout).await?,
            err: File::create(&paths.stderr).await?,
        })
    }

    /// Appends a timestamped progress line to the out log
    async fn note(&mut self, message: impl AsRef<str>) -> Result<(), BuildError> {
        let line = format!(
            "[{}] {}\n",
            Utc::now().format("%Y-%m-%d %H:%M:%S"),
            message.as_ref()
        );
        self.out
            .write_all(line.as_bytes())
            .await
            .map_err(BuildError::LogSink)
    }

    async fn close(mut self) {
        if let Err(e) = self.out.flush().await {
            warn!("Failed to flush out log: {}", e);
        }
        if let Err(e) = self.err.flush().await {
            warn!("Failed to flush err log: {}", e);
        }
    }
}

/// Executes runs against the local filesystem
pub struct BuildExecutor {
    layout: Layout,
    policy: BuildPolicy,
    default_workspace: PathBuf,
    goproxy: Option<String>,
    build_timeout: Duration,
    processes: ProcessRunner,
    source: Arc<dyn SourceSynchronizer>,
    toolchains: Arc<dyn ToolchainResolver>,
    runs: Arc<dyn RunRepository>,
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl BuildExecutor {
    pub fn new(
        config: &RunnerConfig,
        source: Arc<dyn SourceSynchronizer>,
        toolchains: Arc<dyn ToolchainResolver>,
        runs: Arc<dyn RunRepository>,
    ) -> Self {
        Self {
            layout: Layout::new(config),
            policy: config.build_policy(),
            default_workspace: config.default_workspace.clone(),
            goproxy: config.goproxy.clone(),
            build_timeout: config.build_timeout,
            processes: ProcessRunner::new(config.shell.clone()),
            source,
            toolchains,
            runs,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Executes the job on a detached task
    pub fn spawn(self: &Arc<Self>, job: BuildJob) -> tokio::task::JoinHandle<Run> {
        let executor = Arc::clone(self);
        tokio::spawn(async move { executor.execute(job).await })
    }

    /// Executes the job to completion and returns the finished run
    pub async fn execute(&self, job: BuildJob) -> Run {
        let BuildJob {
            mut run,
            project,
            task,
        } = job;

        let lock = self.project_lock(project.id);
        let _guard = lock.lock().await;

        info!(
            "Executing run {} for task {} ({} @ {})",
            run.id, task.id, project.name, task.branch
        );

        let mut logs = None;
        let outcome = AssertUnwindSafe(self.steps(&mut run, &project, &task, &mut logs))
            .catch_unwind()
            .await;

        let (status, failure) = match outcome {
            Ok(Ok(())) => (RunStatus::Success, None),
            Ok(Err(e)) => (RunStatus::Failed, Some(e.to_string())),
            Err(panic) => (
                RunStatus::Failed,
                Some(format!("build panicked: {}", panic_message(panic.as_ref()))),
            ),
        };

        if let Some(mut logs) = logs {
            let summary = match &failure {
                Some(reason) => format!("run failed: {}", reason),
                None => "run succeeded".to_string(),
            };
            if let Err(e) = logs.note(summary).await {
                warn!("Run {}: {}", run.id, e);
            }
            logs.close().await;
        }

        if let Err(e) = run.finish(status) {
            error!("Run {} could not be finalized: {}", run.id, e);
        }
        self.persist(&run).await;

        match failure {
            Some(reason) => warn!("Run {} failed: {}", run.id, reason),
            None => info!("Run {} succeeded", run.id),
        }
        run
    }

    async fn steps(
        &self,
        run: &mut Run,
        project: &Project,
        task: &Task,
        logs: &mut Option<BuildLogs>,
    ) -> Result<(), BuildError> {
        for segment in [&project.name, &task.branch, &task.dest_file] {
            if !layout::stays_inside(segment) {
                return Err(BuildError::InvalidLayout(segment.clone()));
            }
        }

        let paths = self
            .layout
            .log_paths(&project.name, &task.branch, &task.dest_file, run.id);
        let paths = LogPaths {
            stdout: std::path::absolute(&paths.stdout)?,
            stderr: std::path::absolute(&paths.stderr)?,
        };
        if !run.assign_logs(paths.stdout.clone(), paths.stderr.clone()) {
            warn!("Run {} already had log paths assigned", run.id);
        }
        self.persist(run).await;
        let logs = logs.insert(BuildLogs::create(&paths).await.map_err(BuildError::LogSink)?);

        logs.note(format!(
            "run {} of {} branch {} for {}/{}",
            run.id, project.name, task.branch, task.target_os, task.target_arch
        ))
        .await?;

        logs.note(format!(
            "synchronizing {} into {}",
            task.branch,
            project.local_path.display()
        ))
        .await?;
        let commit = self
            .source
            .ensure(
                &project.local_path,
                &project.url,
                &task.branch,
                project.token.as_deref(),
            )
            .await?;

        run.description = commit.to_string();
        self.persist(run).await;
        logs.note(format!("at commit {}", commit)).await?;

        let toolchain = self.toolchains.path(&task.toolchain)?;
        let workspace = std::path::absolute(if project.workspace.as_os_str().is_empty() {
            &self.default_workspace
        } else {
            &project.workspace
        })?;
        let env = env::compose(
            Environment::from_host(),
            &BuildEnv {
                toolchain: &toolchain,
                target_os: task.target_os,
                target_arch: task.target_arch,
                module_mode: project.module_mode,
                workspace: &workspace,
                goproxy: self.goproxy.as_deref(),
                project_vars: &project.env,
                task_vars: &task.env,
            },
        );
        debug!("Run {} environment: {:?}", run.id, env.to_assignments());
        for (key, value) in env.resolved() {
            if key.starts_with("GO") || key == "CGO_ENABLED" {
                logs.note(format!("env {}={}", key, value)).await?;
            }
        }

        if let Some(script) = non_empty(project.before_build.as_deref()) {
            self.run_hook("before-build", script, &project.local_path, &env, logs)
                .await?;
        }

        let artifact = std::path::absolute(self.layout.artifact_path(
            &project.name,
            &task.branch,
            &task.dest_file,
        ))?;
        if let Some(parent) = artifact.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let invocation = Invocation::new(
            toolchain.join("bin").join("go"),
            &project.local_path,
            env.clone(),
        )
        .arg("build")
        .arg("-o")
        .arg(artifact.display().to_string())
        .arg(project.local_path.join(&task.main_file).display().to_string())
        .timeout(self.build_timeout);
        logs.note(format!("running {}", invocation.display())).await?;

        let (started_tx, started_rx) = oneshot::channel();
        let (report, ()) = tokio::join!(
            self.processes
                .run(&invocation, &mut logs.out, &mut logs.err, Some(started_tx)),
            async {
                if let Ok(pid) = started_rx.await {
                    debug!("Run {} compiler started with pid {}", run.id, pid);
                    match run.start() {
                        Ok(()) => self.persist(run).await,
                        Err(e) => warn!("Run {}: {}", run.id, e),
                    }
                }
            }
        );
        self.policy.check("build", &report?)?;

        if let Some(script) = non_empty(project.after_build.as_deref()) {
            self.run_hook("after-build", script, &project.local_path, &env, logs)
                .await?;
        }

        if !tokio::fs::try_exists(&artifact).await? {
            return Err(BuildError::ArtifactMissing(artifact));
        }
        let url = self
            .layout
            .publish_url(&project.name, &task.branch, &task.dest_file);
        logs.note(format!("published {}", url)).await?;
        run.artifact_url = Some(url);

        Ok(())
    }

    async fn run_hook(
        &self,
        name: &str,
        script: &str,
        work_dir: &Path,
        env: &Environment,
        logs: &mut BuildLogs,
    ) -> Result<(), BuildError> {
        logs.note(format!("running {} script", name)).await?;
        let report = self
            .processes
            .run_script(
                script,
                work_dir,
                env,
                self.build_timeout,
                &mut logs.out,
                &mut logs.err,
            )
            .await?;
        self.policy.check(name, &report)
    }

    /// Stores the run, retrying with exponential backoff
    ///
    /// A final failure is logged; the run's in-memory state is authoritative.
    async fn persist(&self, run: &Run) {
        let mut delay = PERSIST_BACKOFF;
        for attempt in 1..=PERSIST_ATTEMPTS {
            match self.runs.update_run(run).await {
                Ok(()) => return,
                Err(e) if attempt < PERSIST_ATTEMPTS => {
                    warn!(
                        "Persisting run {} failed (attempt {}/{}): {}",
                        run.id, attempt, PERSIST_ATTEMPTS, e
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => error!("Giving up persisting run {}: {}", run.id, e),
            }
        }
    }

    fn project_lock(&self, project_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(project_id).or_default())
    }
}

fn non_empty(script: Option<&str>) -> Option<&str> {
    script.filter(|s| !s.trim().is_empty())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(code: Option<i32>, stderr_written: bool, timed_out: bool) -> ExitReport {
        ExitReport {
            code,
            stderr_written,
            timed_out,
        }
    }

    #[test]
    fn test_policy_accepts_clean_exit() {
        let policy = BuildPolicy::default();
        assert!(policy.check("build", &report(Some(0), false, false)).is_ok());
    }

    #[test]
    fn test_policy_rejects_stderr_by_default() {
        let policy = BuildPolicy::default();
        let err = policy
            .check("build", &report(Some(0), true, false))
            .unwrap_err();
        assert_eq!(err.to_string(), "build failed: wrote to stderr");

        let lenient = BuildPolicy {
            fail_on_stderr: false,
        };
        assert!(lenient.check("build", &report(Some(0), true, false)).is_ok());
    }

    #[test]
    fn test_policy_rejects_failures_regardless_of_stderr() {
        let lenient = BuildPolicy {
            fail_on_stderr: false,
        };
        assert!(lenient.check("build", &report(Some(2), false, false)).is_err());
        assert!(lenient.check("build", &report(None, false, false)).is_err());
        assert!(lenient.check("build", &report(None, false, true)).is_err());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(42);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[cfg(unix)]
    mod scenarios {
        use super::super::*;
        use crate::repository::RepositoryError;
        use crate::source::{CommitSummary, GitSynchronizer};
        use crate::testing::Upstream;
        use crate::toolchain::InstalledToolchains;
        use async_trait::async_trait;
        use kiln_core::domain::platform::{TargetArch, TargetOs};
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

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

        /// Records every persisted snapshot
        #[derive(Default)]
        struct RecordingRuns {
            snapshots: Mutex<Vec<Run>>,
        }

        impl RecordingRuns {
            fn snapshots(&self, run_id: Uuid) -> Vec<Run> {
                self.snapshots
                    .lock()
                    .unwrap()
                    .iter()
                    .filter(|r| r.id == run_id)
                    .cloned()
                    .collect()
            }

            fn statuses(&self, run_id: Uuid) -> Vec<RunStatus> {
                self.snapshots(run_id).iter().map(|r| r.status).collect()
            }
        }

        #[async_trait]
        impl RunRepository for RecordingRuns {
            async fn update_run(&self, run: &Run) -> Result<(), RepositoryError> {
                self.snapshots.lock().unwrap().push(run.clone());
                Ok(())
            }
        }

        struct FailingRuns;

        #[async_trait]
        impl RunRepository for FailingRuns {
            async fn update_run(&self, _run: &Run) -> Result<(), RepositoryError> {
                Err(RepositoryError("database is gone".to_string()))
            }
        }

        struct PanickingSource;

        #[async_trait]
        impl SourceSynchronizer for PanickingSource {
            async fn ensure(
                &self,
                _path: &Path,
                _remote_url: &str,
                _branch: &str,
                _credential: Option<&str>,
            ) -> Result<CommitSummary, SyncError> {
                panic!("synchronizer exploded");
            }

            async fn branches(
                &self,
                _remote_url: &str,
                _credential: Option<&str>,
            ) -> Result<Vec<String>, SyncError> {
                Ok(Vec::new())
            }
        }

        struct Fixture {
            temp: TempDir,
            upstream: Upstream,
            config: RunnerConfig,
            runs: Arc<RecordingRuns>,
        }

        impl Fixture {
            fn new(compiler: &str) -> Self {
                let temp = TempDir::new().unwrap();
                let config = RunnerConfig::new(temp.path().join("data"));

                let bin = config.toolchain_dir.join("go1.20.6").join("bin");
                std::fs::create_dir_all(&bin).unwrap();
                let go = bin.join("go");
                std::fs::write(&go, compiler).unwrap();
                std::fs::set_permissions(&go, std::fs::Permissions::from_mode(0o755)).unwrap();

                Self {
                    temp,
                    upstream: Upstream::new(),
                    config,
                    runs: Arc::new(RecordingRuns::default()),
                }
            }

            fn executor_with(
                &self,
                source: Arc<dyn SourceSynchronizer>,
                runs: Arc<dyn RunRepository>,
            ) -> BuildExecutor {
                BuildExecutor::new(
                    &self.config,
                    source,
                    Arc::new(InstalledToolchains::new(&self.config.toolchain_dir)),
                    runs,
                )
            }

            fn executor(&self) -> BuildExecutor {
                self.executor_with(
                    Arc::new(GitSynchronizer::new(Duration::from_secs(30))),
                    self.runs.clone(),
                )
            }

            fn project(&self) -> Project {
                Project {
                    id: Uuid::new_v4(),
                    name: "demo".to_string(),
                    url: self.upstream.url().to_string(),
                    token: None,
                    local_path: self.temp.path().join("checkouts").join("demo"),
                    main_branch: "main".to_string(),
                    module_mode: true,
                    workspace: self.config.default_workspace.clone(),
                    env: String::new(),
                    before_build: None,
                    after_build: None,
                    created_at: Utc::now(),
                }
            }

            fn job(&self, project: &Project, branch: &str) -> BuildJob {
                let task = Task {
                    id: Uuid::new_v4(),
                    project_id: project.id,
                    branch: branch.to_string(),
                    main_file: "cmd/app/main.go".to_string(),
                    dest_file: "app".to_string(),
                    target_os: TargetOs::Linux,
                    target_arch: TargetArch::Amd64,
                    toolchain: "1.20.6".to_string(),
                    env: String::new(),
                    auto_build: false,
                    created_at: Utc::now(),
                };
                BuildJob {
                    run: Run::new(task.id),
                    project: project.clone(),
                    task,
                }
            }

            fn artifact(&self) -> PathBuf {
                self.config.output_dir.join("demo").join("main").join("app")
            }
        }

        fn read(path: &Option<PathBuf>) -> String {
            std::fs::read_to_string(path.as_ref().unwrap()).unwrap()
        }

        #[tokio::test]
        async fn test_successful_build_publishes_artifact() {
            let fixture = Fixture::new(FAKE_GO);
            let project = fixture.project();

            let run = fixture.executor().execute(fixture.job(&project, "main")).await;

            assert_eq!(run.status, RunStatus::Success);
            assert!(run.description.contains(&fixture.upstream.head()));
            assert!(run.description.contains("initial commit"));
            assert_eq!(
                run.artifact_url.as_deref(),
                Some("http://127.0.0.1:8080/output/demo/main/app")
            );
            assert_eq!(std::fs::read_to_string(fixture.artifact()).unwrap(), "binary");
            assert!(run.started_at.is_some());
            assert!(run.finished_at.is_some());

            let out = read(&run.stdout_path);
            assert!(out.contains("compiling"));
            assert!(out.contains("linux/amd64"));
            assert!(out.contains("env GOOS=linux"));
            assert!(out.contains("env GO111MODULE=on"));
            assert!(out.contains("run succeeded"));
            assert_eq!(read(&run.stderr_path), "");

            let statuses = fixture.runs.statuses(run.id);
            assert_eq!(statuses.first(), Some(&RunStatus::Init));
            assert!(statuses.contains(&RunStatus::Running));
            assert_eq!(statuses.last(), Some(&RunStatus::Success));

            // Log paths are persisted before anything else changes
            let first = &fixture.runs.snapshots(run.id)[0];
            assert_eq!(first.stdout_path, run.stdout_path);
            assert!(first.description.is_empty());
        }

        /// `path` spelled relative to the current directory
        fn relative_to_cwd(path: &Path) -> PathBuf {
            let cwd = std::env::current_dir().unwrap();
            let mut relative = PathBuf::new();
            for _ in cwd.components().skip(1) {
                relative.push("..");
            }
            relative.join(path.strip_prefix("/").unwrap())
        }

        #[tokio::test]
        async fn test_relative_data_dir_builds_into_output() {
            let compiler = FAKE_GO.replace(
                "printf 'binary'",
                "echo \"gopath $GOPATH\"\nprintf 'binary'",
            );
            let mut fixture = Fixture::new(&compiler);
            let data_dir = fixture.temp.path().join("data");
            fixture.config = RunnerConfig::new(relative_to_cwd(&data_dir));
            assert!(fixture.config.output_dir.is_relative());
            let project = fixture.project();

            let run = fixture.executor().execute(fixture.job(&project, "main")).await;

            assert_eq!(run.status, RunStatus::Success, "{}", read(&run.stdout_path));
            assert_eq!(
                std::fs::read_to_string(data_dir.join("output/demo/main/app")).unwrap(),
                "binary"
            );
            assert!(!project.local_path.join("data").exists());
            assert!(run.stdout_path.as_ref().unwrap().is_absolute());

            let out = read(&run.stdout_path);
            let gopath = out
                .lines()
                .find_map(|line| line.strip_prefix("gopath "))
                .unwrap();
            assert!(Path::new(gopath).is_absolute());
        }

        #[tokio::test]
        async fn test_escaping_branch_writes_nothing() {
            let fixture = Fixture::new(FAKE_GO);
            let project = fixture.project();
            let outside = fixture.temp.path().join("outside");

            for branch in [outside.display().to_string(), "../../outside".to_string()] {
                let run = fixture.executor().execute(fixture.job(&project, &branch)).await;

                assert_eq!(run.status, RunStatus::Failed);
                assert!(run.stdout_path.is_none());
                assert!(run.started_at.is_none());
            }
            assert!(!outside.exists());
            assert!(!fixture.config.record_dir.exists());
        }

        #[tokio::test]
        async fn test_missing_branch_never_runs() {
            let fixture = Fixture::new(FAKE_GO);
            let project = fixture.project();

            let run = fixture
                .executor()
                .execute(fixture.job(&project, "release"))
                .await;

            assert_eq!(run.status, RunStatus::Failed);
            assert!(run.started_at.is_none());
            assert!(run.artifact_url.is_none());
            assert!(!fixture.runs.statuses(run.id).contains(&RunStatus::Running));
            assert!(read(&run.stdout_path).contains("not found"));
            assert!(!fixture.config.output_dir.join("demo").exists());
        }

        #[tokio::test]
        async fn test_stderr_output_fails_build() {
            let compiler = FAKE_GO.replace(
                "printf 'binary'",
                "echo 'warning: deprecated flag' >&2\nprintf 'binary'",
            );
            let fixture = Fixture::new(&compiler);
            let project = fixture.project();

            let run = fixture.executor().execute(fixture.job(&project, "main")).await;

            assert_eq!(run.status, RunStatus::Failed);
            assert!(run.started_at.is_some());
            assert!(run.artifact_url.is_none());
            assert!(read(&run.stderr_path).contains("deprecated"));
            assert!(read(&run.stdout_path).contains("wrote to stderr"));
        }

        #[tokio::test]
        async fn test_stderr_output_tolerated_when_configured() {
            let compiler = FAKE_GO.replace(
                "printf 'binary'",
                "echo 'warning: deprecated flag' >&2\nprintf 'binary'",
            );
            let mut fixture = Fixture::new(&compiler);
            fixture.config.fail_on_stderr = false;
            let project = fixture.project();

            let run = fixture.executor().execute(fixture.job(&project, "main")).await;
            assert_eq!(run.status, RunStatus::Success);
        }

        #[tokio::test]
        async fn test_compiler_exit_code_fails_build() {
            let fixture = Fixture::new("#!/bin/sh\necho 'syntax error'\nexit 1\n");
            let project = fixture.project();

            let run = fixture.executor().execute(fixture.job(&project, "main")).await;

            assert_eq!(run.status, RunStatus::Failed);
            assert!(fixture.runs.statuses(run.id).contains(&RunStatus::Running));
            assert!(read(&run.stdout_path).contains("exited with code 1"));
        }

        #[tokio::test]
        async fn test_missing_artifact_fails_build() {
            let fixture = Fixture::new("#!/bin/sh\necho 'nothing to do'\n");
            let project = fixture.project();

            let run = fixture.executor().execute(fixture.job(&project, "main")).await;

            assert_eq!(run.status, RunStatus::Failed);
            assert!(run.artifact_url.is_none());
            assert!(read(&run.stdout_path).contains("was not produced"));
        }

        #[tokio::test]
        async fn test_missing_toolchain_fails_before_running() {
            let fixture = Fixture::new(FAKE_GO);
            let project = fixture.project();
            let mut job = fixture.job(&project, "main");
            job.task.toolchain = "1.99.0".to_string();

            let run = fixture.executor().execute(job).await;

            assert_eq!(run.status, RunStatus::Failed);
            assert!(run.started_at.is_none());
            // Sync already happened, so the commit is still recorded
            assert!(run.description.contains(&fixture.upstream.head()));
        }

        #[tokio::test]
        async fn test_build_hooks_run_in_checkout() {
            let fixture = Fixture::new(FAKE_GO);
            let mut project = fixture.project();
            project.before_build = Some("touch before.marker".to_string());
            project.after_build = Some("echo \"after $GOOS\"".to_string());

            let run = fixture.executor().execute(fixture.job(&project, "main")).await;

            assert_eq!(run.status, RunStatus::Success);
            assert!(project.local_path.join("before.marker").exists());
            assert!(read(&run.stdout_path).contains("after linux"));
        }

        #[tokio::test]
        async fn test_failing_before_build_skips_compiler() {
            let fixture = Fixture::new(FAKE_GO);
            let mut project = fixture.project();
            project.before_build = Some("exit 7".to_string());

            let run = fixture.executor().execute(fixture.job(&project, "main")).await;

            assert_eq!(run.status, RunStatus::Failed);
            assert!(run.started_at.is_none());
            assert!(!fixture.artifact().exists());
            assert!(read(&run.stdout_path).contains("before-build failed"));
        }

        #[tokio::test]
        async fn test_panic_still_finishes_run() {
            let fixture = Fixture::new(FAKE_GO);
            let project = fixture.project();
            let executor = fixture.executor_with(Arc::new(PanickingSource), fixture.runs.clone());

            let run = executor.execute(fixture.job(&project, "main")).await;

            assert_eq!(run.status, RunStatus::Failed);
            assert!(run.finished_at.is_some());
            assert!(read(&run.stdout_path).contains("synchronizer exploded"));
            assert_eq!(
                fixture.runs.statuses(run.id).last(),
                Some(&RunStatus::Failed)
            );
        }

        #[tokio::test]
        async fn test_persistence_failure_does_not_change_outcome() {
            let fixture = Fixture::new(FAKE_GO);
            let project = fixture.project();
            let executor = fixture.executor_with(
                Arc::new(GitSynchronizer::new(Duration::from_secs(30))),
                Arc::new(FailingRuns),
            );

            let run = executor.execute(fixture.job(&project, "main")).await;
            assert_eq!(run.status, RunStatus::Success);
        }

        #[tokio::test]
        async fn test_runs_of_one_project_do_not_overlap() {
            let compiler = FAKE_GO.replace("printf 'binary'", "sleep 0.3\nprintf 'binary'");
            let fixture = Fixture::new(&compiler);
            let project = fixture.project();
            let executor = Arc::new(fixture.executor());

            let first = executor.spawn(fixture.job(&project, "main"));
            let second = executor.spawn(fixture.job(&project, "main"));
            let (first, second) = (first.await.unwrap(), second.await.unwrap());

            assert_eq!(first.status, RunStatus::Success);
            assert_eq!(second.status, RunStatus::Success);
            assert_ne!(first.id, second.id);

            let (earlier, later) = if first.started_at <= second.started_at {
                (first, second)
            } else {
                (second, first)
            };
            assert!(earlier.finished_at.unwrap() <= later.started_at.unwrap());
        }
    }
}
