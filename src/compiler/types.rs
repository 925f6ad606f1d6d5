//! Request and result types
//!
//! The wire format matches the original JSON API: numeric `status` and
//! `error_type` codes, and the artifact as a latin-1 (`"binary"`) string.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

use crate::error::Error;

/// A build request as received from the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileRequest {
    /// Exact SDK version (`x.y.z`) or `develop`
    #[serde(rename = "sdk_version", alias = "toolchain_version")]
    pub toolchain_version: String,
    /// File passed to the compiler CLI
    pub entrypoint: String,
    /// Source files keyed by file name
    pub files: BTreeMap<String, String>,
    /// Extra npm dependencies: package name -> version range
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
}

impl CompileRequest {
    /// Create a request with no files and no extra dependencies
    pub fn new(toolchain_version: impl Into<String>, entrypoint: impl Into<String>) -> Self {
        CompileRequest {
            toolchain_version: toolchain_version.into(),
            entrypoint: entrypoint.into(),
            files: BTreeMap::new(),
            dependencies: BTreeMap::new(),
        }
    }

    /// Add a source file
    pub fn with_file(mut self, name: impl Into<String>, contents: impl Into<String>) -> Self {
        self.files.insert(name.into(), contents.into());
        self
    }

    /// Add an npm dependency
    pub fn with_dependency(mut self, name: impl Into<String>, range: impl Into<String>) -> Self {
        self.dependencies.insert(name.into(), range.into());
        self
    }
}

/// Outcome code on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum CompileStatus {
    Success,
    Failure,
}

impl From<CompileStatus> for u8 {
    fn from(status: CompileStatus) -> u8 {
        match status {
            CompileStatus::Success => 1,
            CompileStatus::Failure => 2,
        }
    }
}

impl TryFrom<u8> for CompileStatus {
    type Error = String;

    fn try_from(code: u8) -> std::result::Result<Self, Self::Error> {
        match code {
            1 => Ok(CompileStatus::Success),
            2 => Ok(CompileStatus::Failure),
            other => Err(format!("unknown compile status {}", other)),
        }
    }
}

/// Fault domain of a failed build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ErrorType {
    /// Caller-supplied version, dependencies or sources broke the toolchain
    Client,
    /// The service's own environment or invariants failed
    Service,
}

impl From<ErrorType> for u8 {
    fn from(error_type: ErrorType) -> u8 {
        match error_type {
            ErrorType::Client => 1,
            ErrorType::Service => 2,
        }
    }
}

impl TryFrom<u8> for ErrorType {
    type Error = String;

    fn try_from(code: u8) -> std::result::Result<Self, Self::Error> {
        match code {
            1 => Ok(ErrorType::Client),
            2 => Ok(ErrorType::Service),
            other => Err(format!("unknown error type {}", other)),
        }
    }
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorType::Client => write!(f, "client"),
            ErrorType::Service => write!(f, "service"),
        }
    }
}

/// Compiled contract bytes
///
/// Serialized as a string where byte `b` becomes the character `U+00b`, so
/// `charCodeAt` on the consumer side recovers the exact bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact(Vec<u8>);

impl Artifact {
    pub fn new(bytes: Vec<u8>) -> Self {
        Artifact(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Latin-1 rendering used on the wire
    pub fn to_binary_string(&self) -> String {
        self.0.iter().map(|&b| char::from(b)).collect()
    }

    /// Inverse of [`Artifact::to_binary_string`]
    pub fn from_binary_string(s: &str) -> std::result::Result<Self, Error> {
        s.chars()
            .map(|c| {
                u8::try_from(u32::from(c)).map_err(|_| {
                    Error::InvalidInput(format!(
                        "artifact string contains non-byte character U+{:04X}",
                        u32::from(c)
                    ))
                })
            })
            .collect::<std::result::Result<Vec<u8>, Error>>()
            .map(Artifact)
    }
}

impl Serialize for Artifact {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_binary_string())
    }
}

impl<'de> Deserialize<'de> for Artifact {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Artifact::from_binary_string(&s).map_err(serde::de::Error::custom)
    }
}

/// Outcome of one compile operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "WireResult", try_from = "WireResult")]
pub enum CompileResult {
    Success {
        artifact: Artifact,
        stdout: String,
        stderr: String,
    },
    Failure {
        error_type: ErrorType,
        stdout: Option<String>,
        stderr: Option<String>,
    },
}

impl CompileResult {
    /// Failure without captured output
    pub fn failure(error_type: ErrorType) -> Self {
        CompileResult::Failure {
            error_type,
            stdout: None,
            stderr: None,
        }
    }

    /// Uniform failure for an error, carrying tool output when there is any
    pub fn from_error(err: &Error) -> Self {
        match err.output() {
            Some(output) => CompileResult::Failure {
                error_type: err.error_type(),
                stdout: Some(output.stdout.clone()),
                stderr: Some(output.stderr.clone()),
            },
            None => CompileResult::failure(err.error_type()),
        }
    }

    pub fn status(&self) -> CompileStatus {
        match self {
            CompileResult::Success { .. } => CompileStatus::Success,
            CompileResult::Failure { .. } => CompileStatus::Failure,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CompileResult::Success { .. })
    }

    pub fn error_type(&self) -> Option<ErrorType> {
        match self {
            CompileResult::Success { .. } => None,
            CompileResult::Failure { error_type, .. } => Some(*error_type),
        }
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        match self {
            CompileResult::Success { artifact, .. } => Some(artifact),
            CompileResult::Failure { .. } => None,
        }
    }

    pub fn stdout(&self) -> Option<&str> {
        match self {
            CompileResult::Success { stdout, .. } => Some(stdout),
            CompileResult::Failure { stdout, .. } => stdout.as_deref(),
        }
    }

    pub fn stderr(&self) -> Option<&str> {
        match self {
            CompileResult::Success { stderr, .. } => Some(stderr),
            CompileResult::Failure { stderr, .. } => stderr.as_deref(),
        }
    }
}

/// Flat JSON shape of [`CompileResult`]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireResult {
    status: CompileStatus,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_error_type")]
    error_type: Option<ErrorType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stderr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    wasm_contract: Option<Artifact>,
}

// `0` was the original "NONE" code; read it as absent.
fn lenient_error_type<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<ErrorType>, D::Error> {
    match Option::<u8>::deserialize(deserializer)? {
        None | Some(0) => Ok(None),
        Some(code) => ErrorType::try_from(code)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

impl From<CompileResult> for WireResult {
    fn from(result: CompileResult) -> Self {
        match result {
            CompileResult::Success {
                artifact,
                stdout,
                stderr,
            } => WireResult {
                status: CompileStatus::Success,
                error_type: None,
                stdout: Some(stdout),
                stderr: Some(stderr),
                wasm_contract: Some(artifact),
            },
            CompileResult::Failure {
                error_type,
                stdout,
                stderr,
            } => WireResult {
                status: CompileStatus::Failure,
                error_type: Some(error_type),
                stdout,
                stderr,
                wasm_contract: None,
            },
        }
    }
}

impl TryFrom<WireResult> for CompileResult {
    type Error = String;

    fn try_from(wire: WireResult) -> std::result::Result<Self, Self::Error> {
        match (wire.status, wire.wasm_contract) {
            (CompileStatus::Success, Some(artifact)) => Ok(CompileResult::Success {
                artifact,
                stdout: wire.stdout.unwrap_or_default(),
                stderr: wire.stderr.unwrap_or_default(),
            }),
            (CompileStatus::Success, None) => {
                Err("successful result is missing wasm_contract".to_string())
            }
            (CompileStatus::Failure, Some(_)) => {
                Err("failed result must not carry wasm_contract".to_string())
            }
            (CompileStatus::Failure, None) => Ok(CompileResult::Failure {
                error_type: wire.error_type.unwrap_or(ErrorType::Service),
                stdout: wire.stdout,
                stderr: wire.stderr,
            }),
        }
    }
}
