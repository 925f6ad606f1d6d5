//! Configuration paths
//!
//! Utilities for resolving configuration file paths.

use std::path::PathBuf;

/// Get the configuration directory
pub fn config_dir() -> PathBuf {
    // Check for explicit override
    if let Ok(dir) = std::env::var("NEAR_COMPILER_CONFIG_DIR") {
        return PathBuf::from(dir);
    }

    // Use XDG config directory or fallback
    dirs::config_dir()
        .map(|d| d.join("near-compiler"))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".config").join("near-compiler"))
                .unwrap_or_else(|| PathBuf::from(".near-compiler"))
        })
}

/// Get the main configuration file path
pub fn config_path() -> PathBuf {
    // Check for explicit override
    if let Ok(path) = std::env::var("NEAR_COMPILER_CONFIG") {
        return PathBuf::from(path);
    }

    config_dir().join("config.json")
}

/// Default parent of all build directories: `$TMPDIR/near-compiler`
pub fn default_parent_dir() -> PathBuf {
    std::env::temp_dir().join("near-compiler")
}
