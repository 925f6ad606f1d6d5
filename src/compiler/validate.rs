//! Input validation
//!
//! Runs before any directory is created or any process is spawned.

use regex::Regex;
use std::path::{Component, Path};
use std::sync::LazyLock;
use tracing::error;

use super::manifest::MANIFEST_FILENAME;
use super::types::CompileRequest;
use crate::error::{Error, Result};

/// Version string selecting the unreleased SDK
pub const DEVELOP_VERSION: &str = "develop";

static FILENAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+\.(ts|js)$").expect("valid filename regex"));

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+\.[0-9]+\.[0-9]+$").expect("valid version regex"));

/// Toolchain selection derived from a validated version string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolchainVersion {
    /// Head of the SDK repository
    Develop,
    /// Exact published release
    Release(String),
}

impl ToolchainVersion {
    pub fn parse(version: &str) -> Result<Self> {
        if version == DEVELOP_VERSION {
            Ok(ToolchainVersion::Develop)
        } else if VERSION_RE.is_match(version) {
            Ok(ToolchainVersion::Release(version.to_string()))
        } else {
            Err(Error::InvalidInput(format!("Invalid version name {:?}", version)))
        }
    }
}

impl std::fmt::Display for ToolchainVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolchainVersion::Develop => write!(f, "{}", DEVELOP_VERSION),
            ToolchainVersion::Release(v) => write!(f, "{}", v),
        }
    }
}

/// Check a single source file name
pub fn validate_filename(name: &str) -> Result<()> {
    if FILENAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("Invalid filename {:?}", name)))
    }
}

/// Check that the entrypoint names a path inside the build directory.
///
/// Membership in the request's files is left to the compiler; only paths
/// that escape the directory (absolute, `..`) are rejected.
pub fn validate_entrypoint(entrypoint: &str) -> Result<()> {
    let path = Path::new(entrypoint);
    let contained = !entrypoint.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if contained {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("Invalid entrypoint {:?}", entrypoint)))
    }
}

/// Validate file names, entrypoint and toolchain version of a request.
///
/// The manifest name is exempt; whatever the caller sends under it is
/// replaced by the synthesized manifest.
pub fn validate_request(request: &CompileRequest) -> Result<ToolchainVersion> {
    for name in request.files.keys() {
        if name == MANIFEST_FILENAME {
            continue;
        }
        if let Err(e) = validate_filename(name) {
            error!("{}", e);
            return Err(e);
        }
    }

    validate_entrypoint(&request.entrypoint).inspect_err(|e| error!("{}", e))?;

    ToolchainVersion::parse(&request.toolchain_version).inspect_err(|e| error!("{}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filenames() {
        for ok in ["log.ts", "counter.js", "cross-contract-call.js", "a_b-C9.ts"] {
            assert!(validate_filename(ok).is_ok(), "{}", ok);
        }
        for bad in [
            "a/b.ts",
            "../x.ts",
            "file.py",
            "noext",
            ".ts",
            "a.ts.bak",
            "a b.ts",
            "a.TS",
            "x.tsx",
            "a^b.ts",
            "log.ts\n",
            "",
        ] {
            assert!(validate_filename(bad).is_err(), "{:?}", bad);
        }
    }

    #[test]
    fn test_entrypoints() {
        for ok in ["log.ts", "missing.ts", "./log.ts", "src/main.ts"] {
            assert!(validate_entrypoint(ok).is_ok(), "{}", ok);
        }
        for bad in ["", "/etc/passwd", "../other/a.ts", "src/../../a.ts", ".."] {
            assert!(validate_entrypoint(bad).is_err(), "{:?}", bad);
        }
    }

    #[test]
    fn test_versions() {
        assert_eq!(ToolchainVersion::parse("develop").unwrap(), ToolchainVersion::Develop);
        assert_eq!(
            ToolchainVersion::parse("0.6.0").unwrap(),
            ToolchainVersion::Release("0.6.0".to_string())
        );
        assert!(ToolchainVersion::parse("10.20.300").is_ok());

        for bad in ["", "1.2", "1.2.3.4", "v1.2.3", "1.2.3-beta", "latest", "^1.2.3", "Develop", "١.٢.٣"] {
            assert!(ToolchainVersion::parse(bad).is_err(), "{:?}", bad);
        }
    }

    #[test]
    fn test_request_validation() {
        let req = CompileRequest::new("0.6.0", "log.ts").with_file("log.ts", "");
        assert!(validate_request(&req).is_ok());

        let req = CompileRequest::new("0.6.0", "log.ts")
            .with_file("log.ts", "")
            .with_file(MANIFEST_FILENAME, "{}");
        assert!(validate_request(&req).is_ok());

        let req = CompileRequest::new("0.6.0", "log.ts").with_file("sub/log.ts", "");
        assert!(matches!(validate_request(&req), Err(Error::InvalidInput(_))));

        let req = CompileRequest::new("0.6.0", "../x/log.ts").with_file("log.ts", "");
        assert!(matches!(validate_request(&req), Err(Error::InvalidInput(_))));

        let req = CompileRequest::new("latest", "log.ts").with_file("log.ts", "");
        assert!(matches!(validate_request(&req), Err(Error::InvalidInput(_))));
    }
}
