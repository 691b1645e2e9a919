//! Source synchronization
//!
//! Makes a project's working copy reflect the requested branch of its
//! remote: clone when absent, then fetch, check out and fast-forward. A
//! working copy that cannot be fast-forwarded is reported, never reset.

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Field separator for `git log` output
const FIELD_SEP: char = '\u{1f}';

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("branch '{0}' not found on remote")]
    BranchNotFound(String),

    #[error("working copy cannot be fast-forwarded: {0}")]
    DirtyOrConflicted(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The most recent commit of a synchronized branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    pub id: String,
    pub subject: String,
}

impl fmt::Display for CommitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.subject.is_empty() {
            f.write_str(&self.id)
        } else {
            write!(f, "{} {}", self.id, self.subject)
        }
    }
}

/// Keeps local working copies in line with their remotes
#[async_trait]
pub trait SourceSynchronizer: Send + Sync {
    /// Brings the working copy at `path` to the tip of `branch`
    ///
    /// Safe to call repeatedly; with no upstream changes the second call is
    /// a no-op that returns the same summary.
    async fn ensure(
        &self,
        path: &Path,
        remote_url: &str,
        branch: &str,
        credential: Option<&str>,
    ) -> Result<CommitSummary, SyncError>;

    /// Branch names available on the remote, sorted
    async fn branches(
        &self,
        remote_url: &str,
        credential: Option<&str>,
    ) -> Result<Vec<String>, SyncError>;
}

/// [`SourceSynchronizer`] backed by the `git` command line
pub struct GitSynchronizer {
    git: PathBuf,
    timeout: Duration,
}

struct GitOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

impl GitSynchronizer {
    /// Creates a synchronizer whose calls are bounded by `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self {
            git: PathBuf::from("git"),
            timeout,
        }
    }

    async fn sync(
        &self,
        path: &Path,
        remote: &str,
        branch: &str,
        token: Option<&str>,
    ) -> Result<CommitSummary, SyncError> {
        if branch.is_empty() || branch.starts_with('-') {
            return Err(SyncError::BranchNotFound(branch.to_string()));
        }

        if path.join(".git").exists() {
            let set_url = self
                .git(Some(path), &["remote", "set-url", "origin", remote])
                .await?;
            if !set_url.success {
                return Err(SyncError::SourceUnavailable(mask(&set_url.stderr, token)));
            }
        } else {
            self.clone_into(path, remote, token).await?;
        }

        debug!("Fetching origin into {}", path.display());
        let fetch = self
            .git(Some(path), &["fetch", "--prune", "origin"])
            .await?;
        if !fetch.success {
            return Err(SyncError::SourceUnavailable(mask(&fetch.stderr, token)));
        }

        let remote_ref = format!("refs/remotes/origin/{}", branch);
        if !self.ref_exists(path, &remote_ref).await? {
            return Err(SyncError::BranchNotFound(branch.to_string()));
        }

        let local_ref = format!("refs/heads/{}", branch);
        let checkout = if self.ref_exists(path, &local_ref).await? {
            self.git(Some(path), &["checkout", branch, "--"]).await?
        } else {
            let upstream = format!("origin/{}", branch);
            self.git(
                Some(path),
                &["checkout", "-b", branch, "--track", upstream.as_str()],
            )
            .await?
        };
        if !checkout.success {
            return Err(SyncError::DirtyOrConflicted(checkout.stderr.trim().to_string()));
        }

        let upstream = format!("origin/{}", branch);
        let merge = self
            .git(Some(path), &["merge", "--ff-only", upstream.as_str()])
            .await?;
        if !merge.success {
            return Err(SyncError::DirtyOrConflicted(merge.stderr.trim().to_string()));
        }

        let summary = self.head_commit(path).await?;
        info!(
            "Synchronized {} at {} to {}",
            path.display(),
            branch,
            summary.id
        );
        Ok(summary)
    }

    async fn clone_into(
        &self,
        path: &Path,
        remote: &str,
        token: Option<&str>,
    ) -> Result<(), SyncError> {
        if let Ok(mut entries) = tokio::fs::read_dir(path).await {
            if entries.next_entry().await?.is_some() {
                return Err(SyncError::DirtyOrConflicted(format!(
                    "{} exists and is not a git working copy",
                    path.display()
                )));
            }
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        info!("Cloning {} into {}", mask(remote, token), path.display());
        let target = path.to_string_lossy();
        let clone = self
            .git(
                None,
                &["clone", "--origin", "origin", "--", remote, target.as_ref()],
            )
            .await?;
        if !clone.success {
            return Err(SyncError::SourceUnavailable(mask(&clone.stderr, token)));
        }
        Ok(())
    }

    async fn ref_exists(&self, path: &Path, reference: &str) -> Result<bool, SyncError> {
        let output = self
            .git(Some(path), &["rev-parse", "--verify", "--quiet", reference])
            .await?;
        Ok(output.success)
    }

    async fn head_commit(&self, path: &Path) -> Result<CommitSummary, SyncError> {
        let format = format!("--format=%H{}%s", FIELD_SEP);
        let log = self
            .git(Some(path), &["log", "-1", format.as_str()])
            .await?;
        if !log.success {
            return Err(SyncError::SourceUnavailable(format!(
                "could not read latest commit: {}",
                log.stderr.trim()
            )));
        }
        parse_log_line(&log.stdout).ok_or_else(|| {
            SyncError::SourceUnavailable("could not find latest commit".to_string())
        })
    }

    async fn git(&self, dir: Option<&Path>, args: &[&str]) -> Result<GitOutput, SyncError> {
        let mut command = Command::new(&self.git);
        command
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = dir {
            command.current_dir(dir);
        }

        let output = command.output().await.map_err(|e| {
            SyncError::SourceUnavailable(format!("failed to run {}: {}", self.git.display(), e))
        })?;

        Ok(GitOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[async_trait]
impl SourceSynchronizer for GitSynchronizer {
    async fn ensure(
        &self,
        path: &Path,
        remote_url: &str,
        branch: &str,
        credential: Option<&str>,
    ) -> Result<CommitSummary, SyncError> {
        let remote = authenticated_url(remote_url, credential);
        match tokio::time::timeout(self.timeout, self.sync(path, &remote, branch, credential)).await
        {
            Ok(result) => result,
            Err(_) => Err(SyncError::SourceUnavailable(format!(
                "synchronization timed out after {:?}",
                self.timeout
            ))),
        }
    }

    async fn branches(
        &self,
        remote_url: &str,
        credential: Option<&str>,
    ) -> Result<Vec<String>, SyncError> {
        let remote = authenticated_url(remote_url, credential);
        let listing = tokio::time::timeout(
            self.timeout,
            self.git(None, &["ls-remote", "--heads", "--", remote.as_str()]),
        )
        .await
        .map_err(|_| {
            SyncError::SourceUnavailable(format!("listing branches timed out after {:?}", self.timeout))
        })??;

        if !listing.success {
            return Err(SyncError::SourceUnavailable(mask(&listing.stderr, credential)));
        }

        let mut branches: Vec<String> = listing
            .stdout
            .lines()
            .filter_map(|line| line.split_once('\t'))
            .filter_map(|(_, reference)| reference.strip_prefix("refs/heads/"))
            .map(str::to_string)
            .collect();
        branches.sort();
        Ok(branches)
    }
}

/// Embeds a token into http(s) remote URLs; other remotes are left alone
pub fn authenticated_url(remote: &str, token: Option<&str>) -> String {
    let Some(token) = token.filter(|t| !t.is_empty()) else {
        return remote.to_string();
    };

    match url::Url::parse(remote) {
        Ok(mut url) if matches!(url.scheme(), "http" | "https") => {
            if url.set_username("oauth2").is_ok() && url.set_password(Some(token)).is_ok() {
                url.to_string()
            } else {
                remote.to_string()
            }
        }
        _ => remote.to_string(),
    }
}

fn mask(text: &str, token: Option<&str>) -> String {
    let text = text.trim();
    match token.filter(|t| !t.is_empty()) {
        Some(token) => text.replace(token, "***"),
        None => text.to_string(),
    }
}

fn parse_log_line(output: &str) -> Option<CommitSummary> {
    let line = output.lines().next()?.trim();
    if line.is_empty() {
        return None;
    }
    let (id, subject) = line.split_once(FIELD_SEP).unwrap_or((line, ""));
    Some(CommitSummary {
        id: id.to_string(),
        subject: subject.trim().to_string(),
    })
}
