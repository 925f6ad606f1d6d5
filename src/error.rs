//! Error types for near-compiler

use thiserror::Error;

use crate::compiler::{BuildPhase, ErrorType, ProcessOutput};

/// Result type alias using near-compiler's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for near-compiler
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Request rejected by the input validator
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Build directory could not be created or written
    #[error("Sandbox error: {0}")]
    Sandbox(String),

    /// External tool could not be launched
    #[error("Toolchain error: {0}")]
    Toolchain(String),

    /// External tool ran and failed (non-zero exit or timeout)
    #[error("{phase} failed: {}", describe_exit(.output))]
    ToolFailed {
        phase: BuildPhase,
        output: ProcessOutput,
    },

    /// Compiler reported success but left no usable artifact
    #[error("Missing artifact: {0}")]
    MissingArtifact(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

fn describe_exit(output: &ProcessOutput) -> String {
    if output.timed_out {
        format!("timed out after {:?}", output.elapsed)
    } else {
        match output.exit_code {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

impl Error {
    /// Fault domain reported to the caller.
    ///
    /// Only a failing external tool is attributed to the caller; everything
    /// else, including rejected input, is a service fault.
    pub fn error_type(&self) -> ErrorType {
        match self {
            Error::ToolFailed { .. } => ErrorType::Client,
            _ => ErrorType::Service,
        }
    }

    /// Check if error is a client error (caller's fault)
    pub fn is_client_error(&self) -> bool {
        self.error_type() == ErrorType::Client
    }

    /// Captured process output, if the error carries one
    pub fn output(&self) -> Option<&ProcessOutput> {
        match self {
            Error::ToolFailed { output, .. } => Some(output),
            _ => None,
        }
    }
}

impl From<tokio::sync::AcquireError> for Error {
    fn from(err: tokio::sync::AcquireError) -> Self {
        Error::Internal(format!("admission control closed: {}", err))
    }
}
