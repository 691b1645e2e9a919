//! Target platform types
//!
//! Builds may only target a small allow-list of operating systems and
//! architectures. Names follow the toolchain's own spelling (`GOOS`/`GOARCH`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operating system a build targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetOs {
    Linux,
    Windows,
    Darwin,
}

impl TargetOs {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetOs::Linux => "linux",
            TargetOs::Windows => "windows",
            TargetOs::Darwin => "darwin",
        }
    }

    /// The operating system this process runs on, if it is a supported target
    pub fn host() -> Option<Self> {
        match std::env::consts::OS {
            "linux" => Some(TargetOs::Linux),
            "windows" => Some(TargetOs::Windows),
            "macos" => Some(TargetOs::Darwin),
            _ => None,
        }
    }
}

impl fmt::Display for TargetOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetOs {
    type Err = UnsupportedTarget;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linux" => Ok(TargetOs::Linux),
            "windows" => Ok(TargetOs::Windows),
            "darwin" => Ok(TargetOs::Darwin),
            other => Err(UnsupportedTarget::Os(other.to_string())),
        }
    }
}

/// CPU architecture a build targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetArch {
    #[serde(rename = "386")]
    I386,
    #[serde(rename = "amd64")]
    Amd64,
    #[serde(rename = "arm64")]
    Arm64,
}

impl TargetArch {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetArch::I386 => "386",
            TargetArch::Amd64 => "amd64",
            TargetArch::Arm64 => "arm64",
        }
    }

    /// The architecture this process runs on, if it is a supported target
    pub fn host() -> Option<Self> {
        match std::env::consts::ARCH {
            "x86" => Some(TargetArch::I386),
            "x86_64" => Some(TargetArch::Amd64),
            "aarch64" => Some(TargetArch::Arm64),
            _ => None,
        }
    }
}

impl fmt::Display for TargetArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetArch {
    type Err = UnsupportedTarget;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "386" => Ok(TargetArch::I386),
            "amd64" => Ok(TargetArch::Amd64),
            "arm64" => Ok(TargetArch::Arm64),
            other => Err(UnsupportedTarget::Arch(other.to_string())),
        }
    }
}

/// A target outside the allow-list
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnsupportedTarget {
    #[error("target os '{0}' not allowed (expected linux, windows or darwin)")]
    Os(String),

    #[error("target arch '{0}' not allowed (expected 386, amd64 or arm64)")]
    Arch(String),
}
