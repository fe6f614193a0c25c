//! Scoped disposal of temporary media files.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

/// Owns the media files produced for one item and deletes them when dropped.
///
/// Disposal runs on every exit path, including early returns and panics.
/// With `retain` set nothing is deleted.
#[derive(Debug)]
pub struct CleanupScope {
    paths: Vec<PathBuf>,
    retain: bool,
}

impl CleanupScope {
    pub fn new(retain: bool) -> Self {
        Self {
            paths: Vec::new(),
            retain,
        }
    }

    /// Register a file for disposal. Duplicates are ignored.
    pub fn track(&mut self, path: &Path) {
        if !self.paths.iter().any(|p| p == path) {
            debug!(path = %path.display(), "tracking temporary artifact");
            self.paths.push(path.to_path_buf());
        }
    }

    pub fn tracked(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Delete tracked files now. Failures are logged, never returned.
    pub fn dispose(&mut self) {
        if self.retain {
            if !self.paths.is_empty() {
                info!(files = self.paths.len(), "keeping media files (cleanup disabled)");
            }
            self.paths.clear();
            return;
        }
        for path in self.paths.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => info!(path = %path.display(), "removed temporary media"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove temporary media"),
            }
        }
    }
}

impl Drop for CleanupScope {
    fn drop(&mut self) {
        self.dispose();
    }
}
