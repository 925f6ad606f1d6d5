//! Scripted stand-in for npm used by the orchestration tests.
//!
//! By default it imitates the real toolchain closely enough for the
//! orchestrator: `install` reads `package.json` and fails with an npm 404 for
//! packages whose name contains `does-not-exist`; `build` reads the
//! entrypoint, rejects sources containing `SYNTAX ERROR`, and otherwise writes
//! `build/contract.wasm` as the wasm magic followed by the source text.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::runner::{ProcessOutput, ProcessRunner};
use crate::error::{Error, Result};

/// Behaviour of one phase
#[derive(Debug, Clone)]
pub enum Step {
    /// Imitate the real tool
    Emulate,
    /// Exit 0 without producing an artifact
    NoArtifact,
    /// The binary cannot be launched
    SpawnError,
    Panic,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub workdir: PathBuf,
    pub cache_dir: Option<PathBuf>,
    pub entrypoint: Option<String>,
}

pub struct MockRunner {
    install: Step,
    build: Step,
    delay: Option<Duration>,
    calls: Mutex<Vec<Call>>,
    manifests: Mutex<Vec<serde_json::Value>>,
    listings: Mutex<Vec<Vec<String>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockRunner {
    pub fn new() -> Self {
        MockRunner {
            install: Step::Emulate,
            build: Step::Emulate,
            delay: None,
            calls: Mutex::new(Vec::new()),
            manifests: Mutex::new(Vec::new()),
            listings: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_install(mut self, step: Step) -> Self {
        self.install = step;
        self
    }

    pub fn with_build(mut self, step: Step) -> Self {
        self.build = step;
        self
    }

    /// Sleep this long inside `install`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Parsed `package.json` seen by each install
    pub fn manifests(&self) -> Vec<serde_json::Value> {
        self.manifests.lock().unwrap().clone()
    }

    /// Build directory contents seen by each build
    pub fn listings(&self) -> Vec<Vec<String>> {
        self.listings.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    async fn emulate_install(&self, workdir: &Path) -> Result<ProcessOutput> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let raw = tokio::fs::read_to_string(workdir.join("package.json")).await?;
        let manifest: serde_json::Value = serde_json::from_str(&raw)?;
        self.manifests.lock().unwrap().push(manifest.clone());

        let deps = manifest["dependencies"].as_object().cloned().unwrap_or_default();
        if let Some(missing) = deps.keys().find(|name| name.contains("does-not-exist")) {
            return Ok(ProcessOutput::exited(
                1,
                "",
                format!(
                    "npm ERR! code E404\nnpm ERR! 404 Not Found - GET https://registry.npmjs.org/{}",
                    missing
                ),
            ));
        }

        Ok(ProcessOutput::exited(
            0,
            format!("added {} packages in 1s\n", deps.len()),
            "",
        ))
    }

    async fn emulate_build(&self, workdir: &Path, entrypoint: &str) -> Result<ProcessOutput> {
        let mut listing: Vec<String> = std::fs::read_dir(workdir)?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        listing.sort();
        self.listings.lock().unwrap().push(listing);

        let source = match tokio::fs::read_to_string(workdir.join(entrypoint)).await {
            Ok(source) => source,
            Err(_) => {
                return Ok(ProcessOutput::exited(
                    1,
                    "",
                    format!("Error: Cannot find module '{}'", entrypoint),
                ))
            }
        };
        if source.contains("SYNTAX ERROR") {
            return Ok(ProcessOutput::exited(
                1,
                "Building contract...\n",
                format!("SyntaxError: {}: Unexpected token (1:16)", entrypoint),
            ));
        }

        let mut wasm = b"\0asm\x01\0\0\0".to_vec();
        wasm.extend_from_slice(source.as_bytes());
        tokio::fs::create_dir_all(workdir.join("build")).await?;
        tokio::fs::write(workdir.join("build").join("contract.wasm"), wasm).await?;

        Ok(ProcessOutput::exited(0, "Build success", ""))
    }
}

#[async_trait]
impl ProcessRunner for MockRunner {
    fn name(&self) -> &str {
        "mock"
    }

    async fn install(&self, workdir: &Path, cache_dir: &Path) -> Result<ProcessOutput> {
        self.record(Call {
            workdir: workdir.to_path_buf(),
            cache_dir: Some(cache_dir.to_path_buf()),
            entrypoint: None,
        });
        match self.install {
            Step::Emulate | Step::NoArtifact => self.emulate_install(workdir).await,
            Step::SpawnError => Err(Error::Toolchain("Failed to spawn \"npm\": not found".to_string())),
            Step::Panic => panic!("mock install panicked"),
        }
    }

    async fn build(&self, workdir: &Path, entrypoint: &str) -> Result<ProcessOutput> {
        self.record(Call {
            workdir: workdir.to_path_buf(),
            cache_dir: None,
            entrypoint: Some(entrypoint.to_string()),
        });
        match self.build {
            Step::Emulate => self.emulate_build(workdir, entrypoint).await,
            Step::NoArtifact => Ok(ProcessOutput::exited(0, "Build success", "")),
            Step::SpawnError => Err(Error::Toolchain("Failed to spawn \"npx\": not found".to_string())),
            Step::Panic => panic!("mock build panicked"),
        }
    }
}
