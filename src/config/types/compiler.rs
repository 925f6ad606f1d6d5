//! Compiler configuration types
//!
//! Build root layout, toolchain binaries and the hardening knobs
//! (per-phase timeouts, concurrent build limit).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::compiler::BuildRoot;

/// Build orchestration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Parent of all build directories
    #[serde(default = "default_parent_dir")]
    pub parent_dir: PathBuf,
    /// Shared npm download cache (defaults to `<parent_dir>/npm-cache`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    /// Where the compiler leaves its output, relative to the build directory
    #[serde(default = "default_artifact_path")]
    pub artifact_path: PathBuf,
    /// Wall-clock limit for `npm i` (none by default)
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub install_timeout: Option<Duration>,
    /// Wall-clock limit for the compile step (none by default)
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub build_timeout: Option<Duration>,
    /// Builds allowed in flight at once; 0 means unbounded
    #[serde(default = "default_max_builds")]
    pub max_concurrent_builds: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            parent_dir: default_parent_dir(),
            cache_dir: None,
            artifact_path: default_artifact_path(),
            install_timeout: None,
            build_timeout: None,
            max_concurrent_builds: default_max_builds(),
        }
    }
}

impl CompilerConfig {
    /// Effective cache directory
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.parent_dir.join("npm-cache"))
    }

    pub fn build_root(&self) -> BuildRoot {
        BuildRoot::new(self.parent_dir.clone(), self.cache_dir())
    }
}

fn default_parent_dir() -> PathBuf {
    crate::config::default_parent_dir()
}

fn default_artifact_path() -> PathBuf {
    PathBuf::from("build").join("contract.wasm")
}

fn default_max_builds() -> usize {
    4
}

/// External tool binaries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolchainConfig {
    /// Package manager used for `npm i`
    #[serde(default = "default_npm")]
    pub npm: String,
    /// Runner used for `npx -- near-sdk-js build`
    #[serde(default = "default_npx")]
    pub npx: String,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        ToolchainConfig {
            npm: default_npm(),
            npx: default_npx(),
        }
    }
}

fn default_npm() -> String {
    "npm".to_string()
}

fn default_npx() -> String {
    "npx".to_string()
}
