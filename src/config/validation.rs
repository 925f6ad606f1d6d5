//! Configuration validation
//!
//! Validates configuration and reports issues.

use std::time::Duration;

use super::types::Config;

/// Result of configuration validation
#[derive(Debug, Clone)]
pub struct ConfigValidationResult {
    /// Whether the config is valid
    pub valid: bool,
    /// Validation errors (critical)
    pub errors: Vec<ValidationIssue>,
    /// Validation warnings (non-critical)
    pub warnings: Vec<ValidationIssue>,
}

impl ConfigValidationResult {
    /// Create a valid result
    pub fn valid() -> Self {
        ConfigValidationResult {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add an error
    pub fn with_error(mut self, issue: ValidationIssue) -> Self {
        self.valid = false;
        self.errors.push(issue);
        self
    }

    /// Add a warning
    pub fn with_warning(mut self, issue: ValidationIssue) -> Self {
        self.warnings.push(issue);
        self
    }
}

/// A validation issue
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the config field
    pub path: String,
    /// Issue message
    pub message: String,
    /// Suggested fix
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    /// Create a new issue
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationIssue {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// Add a suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " ({})", suggestion)?;
        }
        Ok(())
    }
}

/// Validate the configuration
pub fn validate_config(config: &Config) -> ConfigValidationResult {
    let mut result = ConfigValidationResult::valid();

    result = validate_compiler_config(config, result);
    result = validate_toolchain_config(config, result);
    result = validate_server_config(config, result);

    result
}

fn validate_compiler_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    let compiler = &config.compiler;

    if !compiler.parent_dir.is_absolute() {
        result = result.with_error(
            ValidationIssue::new(
                "compiler.parent_dir",
                format!(
                    "Build directory parent must be absolute: {}",
                    compiler.parent_dir.display()
                ),
            )
            .with_suggestion("Set NEAR_COMPILER_PARENT_DIR to an absolute path"),
        );
    }

    if compiler.artifact_path.is_absolute()
        || compiler
            .artifact_path
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        result = result.with_error(ValidationIssue::new(
            "compiler.artifact_path",
            "Artifact path must be relative to the build directory",
        ));
    }

    for (path, timeout) in [
        ("compiler.install_timeout", compiler.install_timeout),
        ("compiler.build_timeout", compiler.build_timeout),
    ] {
        if timeout == Some(Duration::ZERO) {
            result = result.with_error(
                ValidationIssue::new(path, "Timeout of zero would fail every build")
                    .with_suggestion("Remove the setting to disable the timeout"),
            );
        }
    }

    if compiler.max_concurrent_builds == 0 {
        result = result.with_warning(
            ValidationIssue::new(
                "compiler.max_concurrent_builds",
                "Concurrent builds are unbounded; each build spawns npm and a private directory tree",
            )
            .with_suggestion("Set a limit close to the number of CPU cores"),
        );
    }

    if !compiler.cache_dir().starts_with(&compiler.parent_dir) {
        result = result.with_warning(ValidationIssue::new(
            "compiler.cache_dir",
            format!(
                "npm cache {} lives outside the build root and is shared with anything else using it",
                compiler.cache_dir().display()
            ),
        ));
    }

    result
}

fn validate_toolchain_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    for (path, binary) in [
        ("toolchain.npm", &config.toolchain.npm),
        ("toolchain.npx", &config.toolchain.npx),
    ] {
        if binary.trim().is_empty() {
            result = result.with_error(ValidationIssue::new(path, "Binary name is empty"));
        } else if which::which(binary).is_err() {
            result = result.with_warning(
                ValidationIssue::new(path, format!("{} not found in PATH", binary))
                    .with_suggestion("Install Node.js or point NPM_BIN/NPX_BIN at the binaries"),
            );
        }
    }

    result
}

fn validate_server_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    if config.server.port == 0 {
        result = result.with_error(ValidationIssue::new("server.port", "Port must be non-zero"));
    }

    if config.server.max_body_bytes == 0 {
        result = result.with_error(ValidationIssue::new(
            "server.max_body_bytes",
            "Body limit of zero rejects every request",
        ));
    }

    result
}
