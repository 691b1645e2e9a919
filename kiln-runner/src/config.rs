//! Runner configuration
//!
//! Defines the directories, timeouts and publishing settings used while
//! executing builds.

use std::path::PathBuf;
use std::time::Duration;

use crate::execution::BuildPolicy;

/// Runner configuration
///
/// Timeouts are configurable so slow remotes or large projects can be tuned
/// without code changes.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Port the artifact server listens on; part of every publish URL
    pub port: u16,

    /// Host name or address clients use to reach the artifact server
    pub public_host: String,

    /// Root directory for built artifacts (`<output>/<project>/<branch>/<dest>`)
    pub output_dir: PathBuf,

    /// Root directory for per-run log files
    pub record_dir: PathBuf,

    /// Directory holding installed toolchains (`<dir>/go<version>`)
    pub toolchain_dir: PathBuf,

    /// GOPATH for projects in module mode
    pub default_workspace: PathBuf,

    /// Optional `GOPROXY` value passed to every build
    pub goproxy: Option<String>,

    /// Upper bound for one source synchronization
    pub sync_timeout: Duration,

    /// Upper bound for one compiler or hook invocation
    pub build_timeout: Duration,

    /// Fail a build when it writes anything to stderr
    pub fail_on_stderr: bool,

    /// Shell used for before/after build scripts
    pub shell: String,
}

impl RunnerConfig {
    /// Creates a configuration rooted at `data_dir` with default settings
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            port: 8080,
            public_host: "127.0.0.1".to_string(),
            output_dir: data_dir.join("output"),
            record_dir: data_dir.join("record"),
            toolchain_dir: data_dir.join("env"),
            default_workspace: data_dir.join("gopath"),
            goproxy: None,
            sync_timeout: Duration::from_secs(60),
            build_timeout: Duration::from_secs(30 * 60),
            fail_on_stderr: true,
            shell: "/bin/sh".to_string(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Every variable is optional:
    /// - KILN_DATA_DIR (base for the directory defaults, default: ./data)
    /// - KILN_PORT (default: 8080)
    /// - KILN_PUBLIC_HOST (default: 127.0.0.1)
    /// - KILN_OUTPUT_DIR, KILN_RECORD_DIR, KILN_TOOLCHAIN_DIR, KILN_DEFAULT_WORKSPACE
    /// - KILN_GOPROXY
    /// - KILN_SYNC_TIMEOUT (seconds, default: 60)
    /// - KILN_BUILD_TIMEOUT (seconds, default: 1800)
    /// - KILN_FAIL_ON_STDERR (true/false, default: true)
    /// - KILN_SHELL (default: /bin/sh)
    pub fn from_env() -> Self {
        let data_dir = std::env::var("KILN_DATA_DIR").unwrap_or_else(|_| "./data".to_string());
        let defaults = Self::new(data_dir);

        let path_var = |name: &str, default: PathBuf| {
            std::env::var(name).map(PathBuf::from).unwrap_or(default)
        };
        let secs_var = |name: &str, default: Duration| {
            std::env::var(name)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            port: std::env::var("KILN_PORT")
                .ok()
                .and_then(|s| s.parse::<u16>().ok())
                .unwrap_or(defaults.port),
            public_host: std::env::var("KILN_PUBLIC_HOST").unwrap_or(defaults.public_host),
            output_dir: path_var("KILN_OUTPUT_DIR", defaults.output_dir),
            record_dir: path_var("KILN_RECORD_DIR", defaults.record_dir),
            toolchain_dir: path_var("KILN_TOOLCHAIN_DIR", defaults.toolchain_dir),
            default_workspace: path_var("KILN_DEFAULT_WORKSPACE", defaults.default_workspace),
            goproxy: std::env::var("KILN_GOPROXY").ok().filter(|s| !s.is_empty()),
            sync_timeout: secs_var("KILN_SYNC_TIMEOUT", defaults.sync_timeout),
            build_timeout: secs_var("KILN_BUILD_TIMEOUT", defaults.build_timeout),
            fail_on_stderr: std::env::var("KILN_FAIL_ON_STDERR")
                .ok()
                .and_then(|s| parse_bool(&s))
                .unwrap_or(defaults.fail_on_stderr),
            shell: std::env::var("KILN_SHELL").unwrap_or(defaults.shell),
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("port must be greater than 0".to_string());
        }

        if self.public_host.is_empty() {
            return Err("public_host cannot be empty".to_string());
        }

        for (name, dir) in [
            ("output_dir", &self.output_dir),
            ("record_dir", &self.record_dir),
            ("toolchain_dir", &self.toolchain_dir),
            ("default_workspace", &self.default_workspace),
        ] {
            if dir.as_os_str().is_empty() {
                return Err(format!("{} cannot be empty", name));
            }
        }

        if self.sync_timeout.is_zero() {
            return Err("sync_timeout must be greater than 0".to_string());
        }

        if self.build_timeout.is_zero() {
            return Err("build_timeout must be greater than 0".to_string());
        }

        if self.shell.is_empty() {
            return Err("shell cannot be empty".to_string());
        }

        Ok(())
    }

    /// Resolves every directory against the current working directory
    ///
    /// Builds run inside the project checkout, so relative directories
    /// would point somewhere else for the compiler.
    pub fn into_absolute(mut self) -> std::io::Result<Self> {
        for dir in [
            &mut self.output_dir,
            &mut self.record_dir,
            &mut self.toolchain_dir,
            &mut self.default_workspace,
        ] {
            *dir = std::path::absolute(&*dir)?;
        }
        Ok(self)
    }

    pub fn build_policy(&self) -> BuildPolicy {
        BuildPolicy {
            fail_on_stderr: self.fail_on_stderr,
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::new("./data")
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
