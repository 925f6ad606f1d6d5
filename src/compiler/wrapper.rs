//! Build orchestration
//!
//! `CompilerWrapper::compile` drives one request through
//!
//! ```text
//! Received -> Validating -> SandboxCreated -> FilesWritten
//!          -> Installing -> Compiling -> Assembling -> Succeeded | Failed
//! ```
//!
//! and removes the build directory before returning, whichever state the
//! run stopped in. Every fault, panics included, comes back as a
//! `CompileResult`; nothing propagates to the caller.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OnceCell, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use super::artifact::{assemble, read_artifact};
use super::manifest::{synthesize, MANIFEST_FILENAME};
use super::runner::{BuildPhase, NpmRunner, ProcessRunner};
use super::types::{CompileRequest, CompileResult, ErrorType};
use super::validate::{validate_request, ToolchainVersion};
use super::workdir::{remove_tree, BuildEnvironment, BuildRoot, TeardownOutcome};
use crate::config::{CompilerConfig, Config};
use crate::error::{Error, Result};

/// Orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Received,
    Validating,
    SandboxCreated,
    FilesWritten,
    Installing,
    Compiling,
    Assembling,
    Succeeded,
    Failed,
}

impl BuildState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildState::Succeeded | BuildState::Failed)
    }
}

/// One state change, timed from the start of the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    pub state: BuildState,
    pub at: Duration,
}

/// Structured record of one compile operation
#[derive(Debug, Clone)]
pub struct BuildTrace {
    pub build_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Build directory, once created
    pub workdir: Option<PathBuf>,
    pub transitions: Vec<StateTransition>,
    pub teardown: TeardownOutcome,
    /// Fault that ended the run, if any
    pub error: Option<String>,
    started: Instant,
}

impl BuildTrace {
    fn new(build_id: Uuid) -> Self {
        let mut trace = BuildTrace {
            build_id,
            started_at: Utc::now(),
            workdir: None,
            transitions: Vec::new(),
            teardown: TeardownOutcome::NotCreated,
            error: None,
            started: Instant::now(),
        };
        trace.enter(BuildState::Received);
        trace
    }

    fn enter(&mut self, state: BuildState) {
        debug!("-> {:?}", state);
        self.transitions.push(StateTransition {
            state,
            at: self.started.elapsed(),
        });
    }

    /// States visited, in order
    pub fn states(&self) -> Vec<BuildState> {
        self.transitions.iter().map(|t| t.state).collect()
    }

    pub fn final_state(&self) -> Option<BuildState> {
        self.transitions.last().map(|t| t.state)
    }

    pub fn elapsed(&self) -> Duration {
        self.transitions.last().map(|t| t.at).unwrap_or_default()
    }
}

/// Compiles contracts, one disposable build directory per request.
///
/// Cheap to share behind an `Arc`; concurrent `compile` calls never share a
/// build directory.
pub struct CompilerWrapper {
    config: CompilerConfig,
    root: BuildRoot,
    root_ready: OnceCell<()>,
    runner: Arc<dyn ProcessRunner>,
    admission: Option<Arc<Semaphore>>,
}

impl CompilerWrapper {
    /// Create a wrapper with an explicit process runner
    pub fn new(config: CompilerConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        let admission = match config.max_concurrent_builds {
            0 => None,
            n => Some(Arc::new(Semaphore::new(n))),
        };
        CompilerWrapper {
            root: config.build_root(),
            config,
            root_ready: OnceCell::new(),
            runner,
            admission,
        }
    }

    /// Create a wrapper that runs the real npm toolchain
    pub fn from_config(config: &Config) -> Self {
        let runner = NpmRunner::new(&config.toolchain, &config.compiler);
        CompilerWrapper::new(config.compiler.clone(), Arc::new(runner))
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn build_root(&self) -> &BuildRoot {
        &self.root
    }

    pub fn runner_name(&self) -> &str {
        self.runner.name()
    }

    /// Create the build root and npm cache. Optional; the first compile
    /// does it otherwise.
    pub async fn init(&self) -> Result<()> {
        self.root_ready
            .get_or_try_init(|| async {
                self.root.init().await?;
                info!(
                    "Build root ready at {} (cache {})",
                    self.root.parent_dir().display(),
                    self.root.cache_dir().display()
                );
                Ok::<(), Error>(())
            })
            .await
            .map(|_| ())
    }

    /// Compile a request
    pub async fn compile(&self, request: CompileRequest) -> CompileResult {
        self.compile_traced(request).await.0
    }

    /// Compile a request and return the run's trace alongside the result
    pub async fn compile_traced(&self, request: CompileRequest) -> (CompileResult, BuildTrace) {
        let build_id = Uuid::new_v4();
        let span = info_span!("compile", build_id = %build_id);
        let mut trace = BuildTrace::new(build_id);

        let run = AssertUnwindSafe(self.run(request, &mut trace))
            .catch_unwind()
            .instrument(span.clone())
            .await;

        let result = match run {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                span.in_scope(|| error!("Build panicked: {}", message));
                // BuildEnvironment's Drop already ran during unwinding; this
                // only confirms the directory is gone.
                if let Some(workdir) = &trace.workdir {
                    trace.teardown = remove_tree(workdir).await;
                }
                trace.error = Some(format!("panic: {}", message));
                trace.enter(BuildState::Failed);
                CompileResult::failure(ErrorType::Service)
            }
        };

        (result, trace)
    }

    async fn run(&self, request: CompileRequest, trace: &mut BuildTrace) -> CompileResult {
        trace.enter(BuildState::Validating);
        let version = match validate_request(&request) {
            Ok(version) => version,
            Err(e) => return fail(trace, e),
        };

        let _permit = match self.admit().await {
            Ok(permit) => permit,
            Err(e) => return fail(trace, e),
        };

        if let Err(e) = self.init().await {
            return fail(trace, e);
        }

        let mut env = match self.root.create().await {
            Ok(env) => env,
            Err(e) => return fail(trace, e),
        };
        trace.workdir = Some(env.path().to_path_buf());
        trace.enter(BuildState::SandboxCreated);
        debug!("Starting build in {}", env.path().display());

        let outcome = self.build_in(&env, request, &version, trace).await;

        trace.teardown = env.destroy().await;

        match outcome {
            Ok(result) => {
                trace.enter(BuildState::Succeeded);
                info!(
                    "Successfully compiled contract ({} bytes) in {:?}",
                    result.artifact().map(|a| a.len()).unwrap_or_default(),
                    trace.elapsed()
                );
                result
            }
            Err(e) => fail(trace, e),
        }
    }

    async fn build_in(
        &self,
        env: &BuildEnvironment,
        request: CompileRequest,
        version: &ToolchainVersion,
        trace: &mut BuildTrace,
    ) -> Result<CompileResult> {
        let CompileRequest {
            entrypoint,
            files,
            dependencies,
            ..
        } = request;

        let manifest = synthesize(version, &dependencies).to_json()?;

        // Caller files first, then the manifest: a caller-supplied
        // package.json is overwritten.
        for (name, contents) in &files {
            env.write_file(name, contents).await?;
        }
        env.write_file(MANIFEST_FILENAME, &manifest).await?;
        trace.enter(BuildState::FilesWritten);

        trace.enter(BuildState::Installing);
        let install = self
            .runner
            .install(env.path(), self.root.cache_dir())
            .await?
            .check(BuildPhase::Install)?;
        debug!("Successfully initialized build environment in {:?}", install.elapsed);

        trace.enter(BuildState::Compiling);
        let build = self
            .runner
            .build(env.path(), &entrypoint)
            .await?
            .check(BuildPhase::Compile)?;
        debug!("Compiler finished in {:?}", build.elapsed);

        trace.enter(BuildState::Assembling);
        let artifact = read_artifact(env, &self.config.artifact_path).await?;
        Ok(assemble(artifact, &install, &build))
    }

    async fn admit(&self) -> Result<Option<OwnedSemaphorePermit>> {
        match &self.admission {
            Some(semaphore) => Ok(Some(semaphore.clone().acquire_owned().await?)),
            None => Ok(None),
        }
    }
}

fn fail(trace: &mut BuildTrace, err: Error) -> CompileResult {
    match err.output() {
        Some(output) => debug!(
            exit_code = ?output.exit_code,
            stdout = %output.stdout,
            stderr = %output.stderr,
            "{}",
            err
        ),
        None => error!("{}", err),
    }
    trace.error = Some(err.to_string());
    trace.enter(BuildState::Failed);
    CompileResult::from_error(&err)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::testutil::{MockRunner, Step};
    use tempfile::{tempdir, TempDir};

    fn wrapper_with(runner: MockRunner) -> (CompilerWrapper, Arc<MockRunner>, TempDir) {
        let dir = tempdir().unwrap();
        let config = CompilerConfig {
            parent_dir: dir.path().join("near-compiler"),
            ..Default::default()
        };
        let runner = Arc::new(runner);
        let wrapper = CompilerWrapper::new(config, runner.clone());
        (wrapper, runner, dir)
    }

    fn log_request() -> CompileRequest {
        CompileRequest::new("0.6.0", "log.ts")
            .with_file("log.ts", "export function log() { near.log('hi'); }")
    }

    fn build_dirs(wrapper: &CompilerWrapper) -> Vec<PathBuf> {
        match std::fs::read_dir(wrapper.build_root().parent_dir()) {
            Ok(entries) => entries
                .map(|e| e.unwrap().path())
                .filter(|p| p != wrapper.build_root().cache_dir())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_successful_build() {
        let (wrapper, runner, _dir) = wrapper_with(MockRunner::new());
        let (result, trace) = wrapper.compile_traced(log_request()).await;

        assert!(result.is_success(), "{:?}", result);
        let artifact = result.artifact().unwrap();
        assert!(artifact.as_bytes().starts_with(b"\0asm"));
        assert!(result.stdout().unwrap().contains("added"));
        assert!(result.stdout().unwrap().contains("Build success"));

        assert_eq!(
            trace.states(),
            vec![
                BuildState::Received,
                BuildState::Validating,
                BuildState::SandboxCreated,
                BuildState::FilesWritten,
                BuildState::Installing,
                BuildState::Compiling,
                BuildState::Assembling,
                BuildState::Succeeded,
            ]
        );
        assert!(trace.final_state().unwrap().is_terminal());
        assert_eq!(trace.teardown, TeardownOutcome::Removed);
        let workdir = trace.workdir.unwrap();
        assert!(!workdir.exists());
        assert!(build_dirs(&wrapper).is_empty());
        assert!(wrapper.build_root().cache_dir().is_dir());

        // install saw the shared cache, both phases the build directory
        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| c.workdir == workdir));
        assert_eq!(calls[0].cache_dir.as_deref(), Some(wrapper.build_root().cache_dir()));
        assert_eq!(calls[0].entrypoint, None);
        assert_eq!(calls[1].entrypoint.as_deref(), Some("log.ts"));

        // teardown is idempotent
        assert_eq!(remove_tree(&workdir).await, TeardownOutcome::AlreadyGone);
    }

    #[tokio::test]
    async fn test_manifest_written_into_build_dir() {
        let (wrapper, runner, _dir) = wrapper_with(MockRunner::new());
        let request = log_request()
            .with_dependency("lodash-es", "^4.17.21")
            .with_file("package.json", r#"{"dependencies":{"evil":"1.0.0"}}"#);

        let result = wrapper.compile(request).await;
        assert!(result.is_success(), "{:?}", result);

        let manifest = runner.manifests().pop().unwrap();
        assert_eq!(manifest["type"], "module");
        assert_eq!(manifest["dependencies"]["near-sdk-js"], "0.6.0");
        assert_eq!(manifest["dependencies"]["ts-morph"], "^16.0.0");
        assert_eq!(manifest["dependencies"]["lodash-es"], "^4.17.21");
        assert!(manifest["dependencies"].get("evil").is_none());
    }

    #[tokio::test]
    async fn test_invalid_filenames_never_create_directory() {
        for name in ["a/b.ts", "file.py", "noext", "../escape.js"] {
            let (wrapper, runner, _dir) = wrapper_with(MockRunner::new());
            let request = CompileRequest::new("0.6.0", "log.ts").with_file(name, "x");

            let (result, trace) = wrapper.compile_traced(request).await;
            assert_eq!(result.error_type(), Some(ErrorType::Service), "{}", name);
            assert!(result.stdout().is_none());
            assert!(trace.workdir.is_none());
            assert_eq!(trace.teardown, TeardownOutcome::NotCreated);
            assert_eq!(
                trace.states(),
                vec![BuildState::Received, BuildState::Validating, BuildState::Failed]
            );
            assert!(build_dirs(&wrapper).is_empty());
            assert!(runner.calls().is_empty());
        }
    }

    #[tokio::test]
    async fn test_invalid_versions_are_service_faults() {
        for version in ["latest", "1.2", "1.2.3.4", "v1.2.3", "", "1.2.3-rc.1"] {
            let (wrapper, runner, _dir) = wrapper_with(MockRunner::new());
            let result = wrapper
                .compile(CompileRequest::new(version, "log.ts").with_file("log.ts", "x"))
                .await;
            assert_eq!(result.error_type(), Some(ErrorType::Service), "{:?}", version);
            assert!(runner.calls().is_empty());
            assert!(build_dirs(&wrapper).is_empty());
        }
    }

    #[tokio::test]
    async fn test_develop_version() {
        let (wrapper, runner, _dir) = wrapper_with(MockRunner::new());
        let request = CompileRequest::new("develop", "log.ts").with_file("log.ts", "x");
        assert!(wrapper.compile(request).await.is_success());

        let manifest = runner.manifests().pop().unwrap();
        assert_eq!(manifest["dependencies"]["near-sdk-js"], "near/near-sdk-js");
        assert!(manifest["dependencies"].get("ts-morph").is_none());
    }

    #[tokio::test]
    async fn test_unknown_dependency_is_client_fault() {
        let (wrapper, _runner, _dir) = wrapper_with(MockRunner::new());
        let request = log_request().with_dependency("this-package-does-not-exist-42", "9.9.9");

        let (result, trace) = wrapper.compile_traced(request).await;
        assert_eq!(result.error_type(), Some(ErrorType::Client));
        assert!(!result.stderr().unwrap().is_empty());
        assert!(result.artifact().is_none());
        assert!(trace.states().contains(&BuildState::Installing));
        assert!(!trace.states().contains(&BuildState::Compiling));
        assert!(!trace.workdir.unwrap().exists());
    }

    #[tokio::test]
    async fn test_source_error_is_client_fault() {
        let (wrapper, _runner, _dir) = wrapper_with(MockRunner::new());
        let request = CompileRequest::new("0.6.0", "broken.ts")
            .with_file("broken.ts", "export function ( { SYNTAX ERROR");

        let (result, trace) = wrapper.compile_traced(request).await;
        assert_eq!(result.error_type(), Some(ErrorType::Client));
        assert!(result.stderr().unwrap().contains("SyntaxError"));
        assert!(result.artifact().is_none());
        assert_eq!(trace.final_state(), Some(BuildState::Failed));
        assert!(!trace.states().contains(&BuildState::Assembling));
        assert!(!trace.workdir.unwrap().exists());
    }

    #[tokio::test]
    async fn test_entrypoint_not_in_files_fails_in_compiler() {
        let (wrapper, _runner, _dir) = wrapper_with(MockRunner::new());
        let request = CompileRequest::new("0.6.0", "missing.ts").with_file("log.ts", "x");

        let result = wrapper.compile(request).await;
        assert_eq!(result.error_type(), Some(ErrorType::Client));
        assert!(build_dirs(&wrapper).is_empty());
    }

    #[tokio::test]
    async fn test_escaping_entrypoint_rejected_before_sandbox() {
        let (wrapper, runner, _dir) = wrapper_with(MockRunner::new());
        for entrypoint in ["../other/log.ts", "/etc/hostname"] {
            let request = CompileRequest::new("0.6.0", entrypoint).with_file("log.ts", "x");
            let (result, trace) = wrapper.compile_traced(request).await;
            assert_eq!(result.error_type(), Some(ErrorType::Service), "{}", entrypoint);
            assert_eq!(trace.teardown, TeardownOutcome::NotCreated);
        }
        assert!(runner.calls().is_empty());
        assert!(build_dirs(&wrapper).is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_is_service_fault_and_torn_down() {
        let (wrapper, runner, _dir) = wrapper_with(MockRunner::new());
        // Passes the filename pattern but exceeds NAME_MAX
        let name = format!("{}.ts", "a".repeat(300));
        let request = CompileRequest::new("0.6.0", name.as_str()).with_file(name.as_str(), "x");

        let (result, trace) = wrapper.compile_traced(request).await;
        assert_eq!(result.error_type(), Some(ErrorType::Service));
        assert_eq!(
            trace.states(),
            vec![
                BuildState::Received,
                BuildState::Validating,
                BuildState::SandboxCreated,
                BuildState::Failed,
            ]
        );
        assert_eq!(trace.teardown, TeardownOutcome::Removed);
        assert!(runner.calls().is_empty());
        assert!(build_dirs(&wrapper).is_empty());
    }

    #[tokio::test]
    async fn test_missing_artifact_is_service_fault() {
        let (wrapper, _runner, _dir) = wrapper_with(MockRunner::new().with_build(Step::NoArtifact));

        let (result, trace) = wrapper.compile_traced(log_request()).await;
        assert_eq!(result.error_type(), Some(ErrorType::Service));
        assert!(result.artifact().is_none());
        assert!(trace.states().contains(&BuildState::Assembling));
        assert!(!trace.workdir.unwrap().exists());
    }

    #[tokio::test]
    async fn test_unlaunchable_tool_is_service_fault() {
        let (wrapper, _runner, _dir) = wrapper_with(MockRunner::new().with_install(Step::SpawnError));

        let (result, trace) = wrapper.compile_traced(log_request()).await;
        assert_eq!(result.error_type(), Some(ErrorType::Service));
        assert!(!trace.workdir.unwrap().exists());
    }

    #[tokio::test]
    async fn test_panic_is_contained_and_cleaned_up() {
        let (wrapper, _runner, _dir) = wrapper_with(MockRunner::new().with_build(Step::Panic));

        let (result, trace) = wrapper.compile_traced(log_request()).await;
        assert_eq!(result.error_type(), Some(ErrorType::Service));
        assert_eq!(trace.final_state(), Some(BuildState::Failed));
        assert!(trace.error.unwrap().contains("panic"));
        assert!(!trace.workdir.unwrap().exists());
        assert!(build_dirs(&wrapper).is_empty());
    }

    #[tokio::test]
    async fn test_unwritable_root_is_service_fault() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();
        let config = CompilerConfig {
            parent_dir: blocker.join("near-compiler"),
            ..Default::default()
        };
        let wrapper = CompilerWrapper::new(config, Arc::new(MockRunner::new()));

        let result = wrapper.compile(log_request()).await;
        assert_eq!(result.error_type(), Some(ErrorType::Service));
    }

    #[tokio::test]
    async fn test_concurrent_builds_are_isolated() {
        let (wrapper, runner, _dir) =
            wrapper_with(MockRunner::new().with_delay(Duration::from_millis(50)));
        let wrapper = Arc::new(wrapper);

        let a = CompileRequest::new("0.6.0", "a.ts").with_file("a.ts", "contract A");
        let b = CompileRequest::new("0.6.0", "b.ts").with_file("b.ts", "contract B");

        let (ra, rb) = tokio::join!(
            wrapper.compile_traced(a),
            wrapper.compile_traced(b)
        );
        let ((result_a, trace_a), (result_b, trace_b)) = (ra, rb);

        assert!(result_a.is_success() && result_b.is_success());
        assert_ne!(trace_a.workdir, trace_b.workdir);
        assert!(result_a.artifact().unwrap().as_bytes().ends_with(b"contract A"));
        assert!(result_b.artifact().unwrap().as_bytes().ends_with(b"contract B"));

        // each build directory only ever held its own source
        for listing in runner.listings() {
            let sources: Vec<_> = listing.iter().filter(|f| f.ends_with(".ts")).collect();
            assert_eq!(sources.len(), 1, "{:?}", listing);
        }
        assert!(build_dirs(&wrapper).is_empty());
    }

    #[tokio::test]
    async fn test_admission_limit() {
        let dir = tempdir().unwrap();
        let config = CompilerConfig {
            parent_dir: dir.path().join("near-compiler"),
            max_concurrent_builds: 2,
            ..Default::default()
        };
        let runner = Arc::new(MockRunner::new().with_delay(Duration::from_millis(30)));
        let wrapper = Arc::new(CompilerWrapper::new(config, runner.clone()));

        let handles: Vec<_> = (0..6)
            .map(|i| {
                let wrapper = wrapper.clone();
                tokio::spawn(async move {
                    let name = format!("c{}.ts", i);
                    wrapper
                        .compile(CompileRequest::new("0.6.0", name.clone()).with_file(name, "x"))
                        .await
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().is_success());
        }
        assert!(runner.max_in_flight() <= 2);
        assert!(runner.max_in_flight() >= 1);
    }

    #[tokio::test]
    async fn test_cancelled_build_leaves_no_directory() {
        let (wrapper, runner, _dir) =
            wrapper_with(MockRunner::new().with_delay(Duration::from_secs(30)));

        let cancelled =
            tokio::time::timeout(Duration::from_millis(100), wrapper.compile(log_request())).await;
        assert!(cancelled.is_err());
        assert_eq!(runner.calls().len(), 1);
        assert!(build_dirs(&wrapper).is_empty());
    }

    #[tokio::test]
    #[ignore = "requires npm and network access"]
    async fn test_real_toolchain_log_example() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.compiler.parent_dir = dir.path().join("near-compiler");
        let wrapper = CompilerWrapper::from_config(&config);
        wrapper.init().await.unwrap();

        let source = r#"
import { NearBindgen, near, call } from "near-sdk-js";

@NearBindgen({})
class LogContract {
  @call({})
  log({ msg }: { msg: string }) {
    near.log(msg);
  }
}
"#;
        let request = CompileRequest::new("0.6.0", "log.ts").with_file("log.ts", source);
        let result = wrapper.compile(request).await;
        assert!(result.is_success(), "{:?}", result.stderr());
        assert!(result.artifact().unwrap().as_bytes().starts_with(b"\0asm"));
    }
}
