//! Compiler module - sandboxed contract builds
//!
//! A request goes through:
//! - validate: file names and SDK version checked before touching disk
//! - workdir: a fresh build directory under the shared build root
//! - manifest: `package.json` derived from the SDK version and extra dependencies
//! - runner: `npm i` then `near-sdk-js build`, as child processes
//! - artifact: `build/contract.wasm` read back into the result
//!
//! `CompilerWrapper` sequences these and always removes the build directory.

mod artifact;
mod manifest;
mod runner;
mod types;
mod validate;
mod workdir;
mod wrapper;

#[cfg(test)]
pub(crate) mod testutil;

pub use artifact::{assemble, read_artifact};
pub use manifest::{synthesize, PackageManifest, MANIFEST_FILENAME, SDK_DEVELOP_REF, SDK_PACKAGE};
pub use runner::{BuildPhase, NpmRunner, ProcessOutput, ProcessRunner};
pub use types::{Artifact, CompileRequest, CompileResult, CompileStatus, ErrorType};
pub use validate::{validate_entrypoint, validate_filename, validate_request, ToolchainVersion, DEVELOP_VERSION};
pub use workdir::{remove_tree, BuildEnvironment, BuildRoot, TeardownOutcome};
pub use wrapper::{BuildState, BuildTrace, CompilerWrapper, StateTransition};
