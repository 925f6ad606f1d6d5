//! Configuration module
//!
//! - types/mod.rs: Core configuration types (Config, ServerConfig)
//! - types/compiler.rs: Build root, toolchain and hardening settings
//! - io.rs: Configuration loading and saving
//! - validation.rs: Configuration validation
//! - paths.rs: Configuration file paths

mod io;
mod paths;
mod types;
mod validation;

// Re-export core config types
pub use types::{Config, ServerConfig};

// Re-export compiler types
pub use types::compiler::{CompilerConfig, ToolchainConfig};

// Re-export IO and utilities
pub use io::{apply_env_overrides, apply_overrides, load_config, load_config_from_path, save_config};
pub use paths::{config_dir, config_path, default_parent_dir};
pub use validation::{validate_config, ConfigValidationResult, ValidationIssue};
