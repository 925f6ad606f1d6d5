//! External toolchain invocation
//!
//! Two phases, each a child process whose working directory is the build
//! directory: `npm i` to fetch the manifest's dependencies, then the SDK's
//! `build` command against the entrypoint.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::{CompilerConfig, ToolchainConfig};
use crate::error::{Error, Result};

use super::manifest::SDK_PACKAGE;

/// Toolchain phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    Install,
    Compile,
}

impl std::fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildPhase::Install => write!(f, "install"),
            BuildPhase::Compile => write!(f, "compile"),
        }
    }
}

/// Captured result of one child process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code (None if killed by a signal or timed out)
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
    /// Was the process killed because it ran too long?
    pub timed_out: bool,
}

impl ProcessOutput {
    /// Create a result for a process that exited normally
    pub fn exited(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        ProcessOutput {
            exit_code: Some(exit_code),
            stdout: stdout.into(),
            stderr: stderr.into(),
            elapsed: Duration::ZERO,
            timed_out: false,
        }
    }

    /// Create a timeout result
    pub fn timeout(timeout: Duration) -> Self {
        ProcessOutput {
            exit_code: None,
            stdout: String::new(),
            stderr: format!("Process timed out after {:?} and was killed", timeout),
            elapsed: timeout,
            timed_out: true,
        }
    }

    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Turn a failed run into the phase's error
    pub fn check(self, phase: BuildPhase) -> Result<ProcessOutput> {
        if self.success() {
            Ok(self)
        } else {
            Err(Error::ToolFailed {
                phase,
                output: self,
            })
        }
    }
}

/// Backend that runs the two toolchain phases
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Get the runner name
    fn name(&self) -> &str;

    /// Fetch the dependencies listed in `workdir/package.json`
    async fn install(&self, workdir: &Path, cache_dir: &Path) -> Result<ProcessOutput>;

    /// Compile `entrypoint`; on success the artifact is under `workdir/build/`
    async fn build(&self, workdir: &Path, entrypoint: &str) -> Result<ProcessOutput>;
}

/// Runs the real `npm` / `npx` binaries
pub struct NpmRunner {
    npm: String,
    npx: String,
    install_timeout: Option<Duration>,
    build_timeout: Option<Duration>,
}

impl NpmRunner {
    pub fn new(toolchain: &ToolchainConfig, compiler: &CompilerConfig) -> Self {
        NpmRunner {
            npm: toolchain.npm.clone(),
            npx: toolchain.npx.clone(),
            install_timeout: compiler.install_timeout,
            build_timeout: compiler.build_timeout,
        }
    }

    async fn run(
        &self,
        mut command: Command,
        workdir: &Path,
        timeout: Option<Duration>,
    ) -> Result<ProcessOutput> {
        command
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Running {:?} in {}", command.as_std(), workdir.display());

        let program = command.as_std().get_program().to_os_string();
        let start = Instant::now();
        let child = command
            .spawn()
            .map_err(|e| Error::Toolchain(format!("Failed to spawn {:?}: {}", program, e)))?;

        let output = match timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(output) => output,
                Err(_) => {
                    // child was moved into the timed-out future; dropping it kills the process
                    warn!("Process timed out after {:?}", limit);
                    return Ok(ProcessOutput::timeout(limit));
                }
            },
            None => child.wait_with_output().await,
        }
        .map_err(|e| Error::Toolchain(format!("Process error: {}", e)))?;

        Ok(ProcessOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            elapsed: start.elapsed(),
            timed_out: false,
        })
    }
}

#[async_trait]
impl ProcessRunner for NpmRunner {
    fn name(&self) -> &str {
        "npm"
    }

    async fn install(&self, workdir: &Path, cache_dir: &Path) -> Result<ProcessOutput> {
        let mut command = Command::new(&self.npm);
        command.arg("i").arg("--cache").arg(cache_dir);
        self.run(command, workdir, self.install_timeout).await
    }

    async fn build(&self, workdir: &Path, entrypoint: &str) -> Result<ProcessOutput> {
        let mut command = Command::new(&self.npx);
        command
            .args(["--", SDK_PACKAGE, "build", "--verbose"])
            .arg(entrypoint);
        self.run(command, workdir, self.build_timeout).await
    }
}
