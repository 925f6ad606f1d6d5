//! Configuration types module

pub mod compiler;

use serde::{Deserialize, Serialize};

/// Main application configuration
///
/// Built once at startup and handed to the compiler; never mutated after.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Build directories, timeouts and admission control
    #[serde(default)]
    pub compiler: compiler::CompilerConfig,

    /// External tool binaries
    #[serde(default)]
    pub toolchain: compiler::ToolchainConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from environment variables and files
    ///
    /// It loads configuration from:
    /// 1. Default values
    /// 2. Config file (if present)
    /// 3. Environment variable overrides
    pub fn from_env() -> crate::error::Result<Self> {
        crate::config::load_config()
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Port to bind to
    #[serde(default = "default_port")]
    pub port: u16,
    /// Largest accepted request body
    #[serde(default = "default_max_body")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: default_bind(),
            port: default_port(),
            max_body_bytes: default_max_body(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_max_body() -> usize {
    8 * 1024 * 1024 // 8MB
}
