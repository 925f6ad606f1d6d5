//! Per-build working directories
//!
//! Layout under the build root:
//!
//! ```text
//! <parent_dir>/
//! ├── npm-cache/        shared download cache, never removed here
//! └── <uuid>/           one BuildEnvironment, removed after the build
//!     ├── *.ts / *.js
//!     ├── package.json
//!     └── build/contract.wasm
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Fixed locations shared by all builds
#[derive(Debug, Clone)]
pub struct BuildRoot {
    parent_dir: PathBuf,
    cache_dir: PathBuf,
}

impl BuildRoot {
    pub fn new(parent_dir: PathBuf, cache_dir: PathBuf) -> Self {
        BuildRoot {
            parent_dir,
            cache_dir,
        }
    }

    pub fn parent_dir(&self) -> &Path {
        &self.parent_dir
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Create the parent and cache directories. Safe to call repeatedly.
    pub async fn init(&self) -> Result<()> {
        for dir in [&self.parent_dir, &self.cache_dir] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                Error::Sandbox(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }

    /// Allocate a fresh, uniquely named build directory
    pub async fn create(&self) -> Result<BuildEnvironment> {
        let id = Uuid::new_v4();
        let path = self.parent_dir.join(id.simple().to_string());

        // create_dir, not create_dir_all: an existing directory is a collision
        tokio::fs::create_dir(&path).await.map_err(|e| {
            Error::Sandbox(format!(
                "Failed to create build directory {}: {}",
                path.display(),
                e
            ))
        })?;

        debug!("Created build directory {}", path.display());
        Ok(BuildEnvironment {
            id,
            path,
            destroyed: false,
        })
    }
}

/// How teardown of a build directory went
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownOutcome {
    /// No directory was ever created
    NotCreated,
    Removed,
    AlreadyGone,
    Failed(String),
}

/// One exclusively owned build directory.
///
/// Call [`BuildEnvironment::destroy`] when done. If the value is dropped
/// first (early return, panic, cancelled future) the directory is removed
/// synchronously in `Drop`.
#[derive(Debug)]
pub struct BuildEnvironment {
    id: Uuid,
    path: PathBuf,
    destroyed: bool,
}

impl BuildEnvironment {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a file directly under the build directory
    pub async fn write_file(&self, name: &str, contents: &str) -> Result<()> {
        let target = self.path.join(name);
        tokio::fs::write(&target, contents).await.map_err(|e| {
            Error::Sandbox(format!("Error when saving file {} to workdir: {}", name, e))
        })
    }

    /// Recursively remove the directory. Never fails; problems are logged.
    pub async fn destroy(&mut self) -> TeardownOutcome {
        let outcome = remove_tree(&self.path).await;
        self.destroyed = true;
        outcome
    }
}

impl Drop for BuildEnvironment {
    fn drop(&mut self) {
        if self.destroyed {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("Removed build directory {} on drop", self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove build directory {} on drop: {}",
                self.path.display(),
                e
            ),
        }
    }
}

/// Forced recursive removal: a missing path is not an error, and a failed
/// attempt is retried once before giving up.
pub async fn remove_tree(path: &Path) -> TeardownOutcome {
    let mut last_error = None;
    for _ in 0..2 {
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => {
                debug!("Removed build directory {}", path.display());
                return TeardownOutcome::Removed;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => return TeardownOutcome::AlreadyGone,
            Err(e) => last_error = Some(e),
        }
    }

    let message = last_error.map(|e| e.to_string()).unwrap_or_default();
    warn!(
        "Failed to remove build directory {}: {}",
        path.display(),
        message
    );
    TeardownOutcome::Failed(message)
}
