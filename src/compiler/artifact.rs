//! Reading back the compiled contract and packaging the result

use std::path::Path;
use tracing::error;

use super::runner::ProcessOutput;
use super::types::{Artifact, CompileResult};
use super::workdir::BuildEnvironment;
use crate::error::{Error, Result};

/// Read the artifact the compiler left in the build directory.
///
/// A missing or empty file after a successful build is the toolchain
/// breaking its contract, not a caller mistake.
pub async fn read_artifact(env: &BuildEnvironment, relative_path: &Path) -> Result<Artifact> {
    let path = env.path().join(relative_path);
    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        error!("Failed to read artifact {}: {}", path.display(), e);
        Error::MissingArtifact(format!("{}: {}", relative_path.display(), e))
    })?;

    if bytes.is_empty() {
        error!("Artifact {} is empty", path.display());
        return Err(Error::MissingArtifact(format!(
            "{}: empty file",
            relative_path.display()
        )));
    }

    Ok(Artifact::new(bytes))
}

/// Successful result with both phases' output, install first
pub fn assemble(artifact: Artifact, install: &ProcessOutput, build: &ProcessOutput) -> CompileResult {
    CompileResult::Success {
        artifact,
        stdout: join_streams(&install.stdout, &build.stdout),
        stderr: join_streams(&install.stderr, &build.stderr),
    }
}

fn join_streams(first: &str, second: &str) -> String {
    match (first.is_empty(), second.is_empty()) {
        (true, _) => second.to_string(),
        (_, true) => first.to_string(),
        _ if first.ends_with('\n') => format!("{}{}", first, second),
        _ => format!("{}\n{}", first, second),
    }
}
