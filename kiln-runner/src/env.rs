//! Build environment composition
//!
//! Turns project and task configuration into the environment handed to the
//! compiler. Composition order, later entries overriding earlier ones:
//!
//! 1. host environment
//! 2. module mode (`GO111MODULE`)
//! 3. toolchain paths (`GOROOT`, `PATH`, `GOPATH`, `GOCACHE`, `GOPROXY`)
//! 4. target platform (`GOOS`, `GOARCH`)
//! 5. project-level extra assignments
//! 6. task-level extra assignments

use kiln_core::domain::platform::{TargetArch, TargetOs};
use std::path::Path;
use tracing::debug;

const PATH_SEPARATOR: char = if cfg!(windows) { ';' } else { ':' };

/// Ordered list of environment assignments
///
/// Duplicate keys are kept in insertion order; the last one wins when the
/// environment is resolved or applied to a command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: Vec<(String, String)>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current process environment
    ///
    /// Entries that are not valid unicode are skipped.
    pub fn from_host() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
            .collect();
        Self { vars }
    }

    /// Appends an assignment
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.push((key.into(), value.into()));
    }

    /// Appends every well-formed assignment in `text`
    pub fn extend_assignments(&mut self, text: &str) {
        self.vars.extend(parse_assignments(text));
    }

    /// The winning value for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// `KEY=VALUE` strings in insertion order
    pub fn to_assignments(&self) -> Vec<String> {
        self.vars
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect()
    }

    /// One entry per key, holding the last assigned value
    ///
    /// Keys keep the position of their first occurrence.
    pub fn resolved(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = Vec::with_capacity(self.vars.len());
        for (key, value) in &self.vars {
            match out.iter_mut().find(|(k, _)| k == key) {
                Some(slot) => slot.1 = value.clone(),
                None => out.push((key.clone(), value.clone())),
            }
        }
        out
    }

    /// Replaces the command's environment with this one
    pub fn apply(&self, command: &mut tokio::process::Command) {
        command.env_clear();
        command.envs(self.resolved());
    }
}

/// Inputs for composing a build environment
#[derive(Debug, Clone)]
pub struct BuildEnv<'a> {
    pub toolchain: &'a Path,
    pub target_os: TargetOs,
    pub target_arch: TargetArch,
    pub module_mode: bool,
    pub workspace: &'a Path,
    pub goproxy: Option<&'a str>,
    pub project_vars: &'a str,
    pub task_vars: &'a str,
}

/// Composes the build environment on top of `base`
pub fn compose(base: Environment, build: &BuildEnv<'_>) -> Environment {
    let mut env = base;

    env.set(
        "GO111MODULE",
        if build.module_mode { "on" } else { "off" },
    );

    let toolchain_bin = build.toolchain.join("bin");
    let path = match env.get("PATH") {
        Some(existing) if !existing.is_empty() => format!(
            "{}{}{}",
            toolchain_bin.display(),
            PATH_SEPARATOR,
            existing
        ),
        _ => toolchain_bin.display().to_string(),
    };
    env.set("GOROOT", build.toolchain.display().to_string());
    env.set("PATH", path);
    env.set("GOPATH", build.workspace.display().to_string());
    env.set("GOCACHE", build.workspace.join(".cache").display().to_string());
    if let Some(proxy) = build.goproxy {
        env.set("GOPROXY", proxy);
    }

    env.set("GOOS", build.target_os.as_str());
    env.set("GOARCH", build.target_arch.as_str());

    env.extend_assignments(build.project_vars);
    env.extend_assignments(build.task_vars);

    env
}

/// Parses newline or semicolon delimited `KEY=VALUE` assignments
///
/// Lines without `=` or with an empty key are dropped. Values may contain
/// further `=` characters.
pub fn parse_assignments(text: &str) -> Vec<(String, String)> {
    text.split(['\n', ';'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match line.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Some((key.trim().to_string(), value.trim().to_string()))
            }
            _ => {
                debug!("Skipping malformed environment assignment: {}", line);
                None
            }
        })
        .collect()
}
