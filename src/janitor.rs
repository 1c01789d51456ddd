//! Removal of transient files.
//!
//! A [`Janitor`] records every transient path before the file is created and
//! deletes them all when dropped, so cleanup runs on success, on an early
//! return with an error, and during unwinding.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Deletes each path if present. Failures are logged, never returned.
///
/// Returns how many files were actually removed.
pub fn cleanup<P: AsRef<Path>>(paths: &[P]) -> usize {
    let mut removed = 0;
    for path in paths {
        let path = path.as_ref();
        match fs::remove_file(path) {
            Ok(()) => {
                tracing::debug!("Deleted temporary file: {}", path.display());
                removed += 1;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Could not delete {}: {}", path.display(), e),
        }
    }
    removed
}

/// Owns the transient files of one run.
#[derive(Debug, Default)]
pub struct Janitor {
    paths: Vec<PathBuf>,
    kept: Vec<PathBuf>,
}

impl Janitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a path for deletion and hands it back.
    pub fn track(&mut self, path: impl Into<PathBuf>) -> PathBuf {
        let path = path.into();
        self.paths.push(path.clone());
        path
    }

    /// Registers a path that only gets deleted when `keep` is false.
    pub fn track_unless(&mut self, path: impl Into<PathBuf>, keep: bool) -> PathBuf {
        if keep {
            let path = path.into();
            self.kept.push(path.clone());
            path
        } else {
            self.track(path)
        }
    }

    /// Paths still pending deletion.
    pub fn pending(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Paths registered as kept.
    pub fn kept(&self) -> &[PathBuf] {
        &self.kept
    }

    /// Deletes every registered path. Safe to call repeatedly.
    pub fn cleanup(&mut self) -> usize {
        let paths = std::mem::take(&mut self.paths);
        cleanup(&paths)
    }
}

impl Drop for Janitor {
    fn drop(&mut self) {
        self.cleanup();
    }
}
