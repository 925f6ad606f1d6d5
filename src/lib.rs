//! # near-compiler
//!
//! Remote build service for NEAR JavaScript/TypeScript contracts.
//!
//! ## Features
//!
//! - **Disposable Builds:** every request compiles in its own directory, removed on every exit path
//! - **Two-Phase Toolchain:** `npm i` against a shared download cache, then `near-sdk-js build`
//! - **Fault Domains:** failures are tagged CLIENT (fix the request) or SERVICE (our side)
//! - **HTTP API:** `POST /compile` takes a request body and returns the result as JSON

pub mod compiler;
pub mod config;
pub mod error;
pub mod server;

pub use compiler::{CompileRequest, CompileResult, CompilerWrapper};
pub use config::Config;
pub use error::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
