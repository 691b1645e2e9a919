//! Shared fixtures for tests that need a real git remote

use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

/// Runs git in `dir` and returns trimmed stdout, panicking on failure
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=kiln",
            "-c",
            "user.email=kiln@example.com",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .expect("git should be installed");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A local repository standing in for a remote, with a `main` branch
pub struct Upstream {
    dir: TempDir,
    url: String,
}

impl Upstream {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        git(dir.path(), &["init", "--quiet"]);
        git(dir.path(), &["checkout", "--quiet", "-b", "main"]);
        let url = dir.path().to_string_lossy().into_owned();
        let upstream = Self { dir, url };
        upstream.commit(
            "cmd/app/main.go",
            "package main\n\nfunc main() {}\n",
            "initial commit",
        );
        upstream
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Commits `contents` to `file` on the current branch, returning the id
    pub fn commit(&self, file: &str, contents: &str, message: &str) -> String {
        let path = self.dir.path().join(file);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, contents).unwrap();
        git(self.dir.path(), &["add", file]);
        git(self.dir.path(), &["commit", "--quiet", "-m", message]);
        self.head()
    }

    /// Creates `name` from `main` with one extra commit, then returns to `main`
    pub fn branch(&self, name: &str, file: &str, message: &str) -> String {
        git(self.dir.path(), &["checkout", "--quiet", "-b", name, "main"]);
        let head = self.commit(file, message, message);
        git(self.dir.path(), &["checkout", "--quiet", "main"]);
        head
    }

    pub fn head(&self) -> String {
        git(self.dir.path(), &["rev-parse", "HEAD"])
    }
}
