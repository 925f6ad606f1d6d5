//! Configuration I/O - Loading and saving configuration
//!
//! Handles reading configuration from files and environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::types::Config;
use crate::error::{Error, Result};

/// Load configuration with layered precedence:
/// 1. Config file (config.json / config.toml) if it exists, otherwise defaults
/// 2. Environment variable overrides (includes .env)
pub fn load_config() -> Result<Config> {
    let config_path = super::paths::config_path();

    let mut config = if config_path.exists() {
        load_config_from_path(&config_path)?
    } else {
        Config::default()
    };

    // Apply environment variable overrides (highest precedence)
    apply_env_overrides(&mut config)?;

    Ok(config)
}

/// Load configuration from a specific path
pub fn load_config_from_path(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    // Detect format by extension
    let config: Config = if path.extension().is_some_and(|ext| ext == "json") {
        // Parse as JSON5 (more lenient than strict JSON)
        json5::from_str(&content).map_err(|e| Error::Config(format!("Invalid JSON config: {}", e)))?
    } else if path.extension().is_some_and(|ext| ext == "toml") {
        toml::from_str(&content).map_err(|e| Error::Config(format!("Invalid TOML config: {}", e)))?
    } else {
        // Try JSON5 first, then TOML
        json5::from_str(&content)
            .or_else(|_| toml::from_str(&content).map_err(|e| Error::Config(e.to_string())))
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?
    };

    Ok(config)
}

/// Apply environment variable overrides to an existing config.
///
/// Loads `.env` first. Env vars have the highest precedence:
/// defaults < file < env.
pub fn apply_env_overrides(config: &mut Config) -> Result<()> {
    dotenvy::dotenv().ok();
    apply_overrides(config, |key| std::env::var(key).ok())
}

/// Apply overrides from any key lookup. Malformed values are an error
/// rather than being silently ignored.
pub fn apply_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    // Compiler overrides
    if let Some(dir) = lookup("NEAR_COMPILER_PARENT_DIR") {
        config.compiler.parent_dir = PathBuf::from(dir);
    }
    if let Some(dir) = lookup("NEAR_COMPILER_CACHE_DIR") {
        config.compiler.cache_dir = Some(PathBuf::from(dir));
    }
    if let Some(timeout) = lookup("NEAR_COMPILER_INSTALL_TIMEOUT") {
        config.compiler.install_timeout = parse_timeout("NEAR_COMPILER_INSTALL_TIMEOUT", &timeout)?;
    }
    if let Some(timeout) = lookup("NEAR_COMPILER_BUILD_TIMEOUT") {
        config.compiler.build_timeout = parse_timeout("NEAR_COMPILER_BUILD_TIMEOUT", &timeout)?;
    }
    if let Some(max) = lookup("NEAR_COMPILER_MAX_BUILDS") {
        config.compiler.max_concurrent_builds = max.trim().parse().map_err(|e| {
            Error::Config(format!("Invalid NEAR_COMPILER_MAX_BUILDS {:?}: {}", max, e))
        })?;
    }

    // Toolchain overrides
    if let Some(npm) = lookup("NPM_BIN") {
        config.toolchain.npm = npm;
    }
    if let Some(npx) = lookup("NPX_BIN") {
        config.toolchain.npx = npx;
    }

    // Server overrides
    if let Some(port) = lookup("PORT") {
        config.server.port = port
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid PORT {:?}: {}", port, e)))?;
    }
    if let Some(bind) = lookup("BIND") {
        config.server.bind = bind;
    }

    Ok(())
}

// "off" or "none" clears a timeout set in the config file
fn parse_timeout(key: &str, value: &str) -> Result<Option<Duration>> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("off") || value.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    humantime::parse_duration(value)
        .map(Some)
        .map_err(|e| Error::Config(format!("Invalid {} {:?}: {}", key, value, e)))
}

/// Save configuration to a file
pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    let content = if path.extension().is_some_and(|ext| ext == "toml") {
        toml::to_string_pretty(config).map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?
    } else {
        serde_json::to_string_pretty(config)?
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, content)?;
    Ok(())
}
