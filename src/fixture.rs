//! Fixture files that trigger rebuilds in the watched tree
//!
//! `FixtureGuard` tracks every file it writes (or was asked to clear) and
//! removes them again on Drop, on any exit path.

use crate::error::{HarnessError, Result};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Tracks trigger files under a fixture root
pub struct FixtureGuard {
    root: PathBuf,
    tracked: Mutex<Vec<PathBuf>>,
}

impl FixtureGuard {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tracked: Mutex::new(Vec::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `path` against the fixture root (absolute paths pass through)
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        self.root.join(path)
    }

    /// Remove leftovers from an earlier run and track the paths for cleanup
    pub fn prepare<P: AsRef<Path>>(&self, paths: &[P]) -> Result<()> {
        for path in paths {
            let full = self.resolve(path);
            remove_if_exists(&full)?;
            self.track(full);
        }
        Ok(())
    }

    /// Write a trigger file, creating parent directories as needed
    pub fn write(&self, path: impl AsRef<Path>, contents: &str) -> Result<PathBuf> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).map_err(|e| HarnessError::io(parent, e))?;
        }
        std::fs::write(&full, contents).map_err(|e| HarnessError::io(&full, e))?;
        debug!(path = %full.display(), bytes = contents.len(), "wrote trigger file");
        self.track(full.clone());
        Ok(full)
    }

    /// Remove a file if present; a missing file is fine
    pub fn remove(&self, path: impl AsRef<Path>) -> Result<()> {
        remove_if_exists(&self.resolve(path))
    }

    /// Snapshot of tracked paths
    pub fn tracked(&self) -> Vec<PathBuf> {
        self.tracked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn track(&self, path: PathBuf) {
        // Cleanup must still work after a panic poisoned the lock
        let mut tracked = self.tracked.lock().unwrap_or_else(|e| e.into_inner());
        if !tracked.contains(&path) {
            tracked.push(path);
        }
    }
}

impl Drop for FixtureGuard {
    fn drop(&mut self) {
        let tracked = self.tracked.lock().unwrap_or_else(|e| e.into_inner());
        for path in tracked.iter() {
            if let Err(e) = remove_if_exists(path) {
                warn!("fixture cleanup failed: {}", e);
            }
        }
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed fixture file");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(HarnessError::io(path, e)),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_creates_parents_and_tracks() {
        let dir = TempDir::new().unwrap();
        let guard = FixtureGuard::new(dir.path());

        let path = guard.write("test/new.ts", "export {};\n").unwrap();
        assert_eq!(path, dir.path().join("test/new.ts"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "export {};\n");
        assert_eq!(guard.tracked(), vec![path]);
    }

    #[test]
    fn test_drop_removes_written_files() {
        let dir = TempDir::new().unwrap();
        let path = {
            let guard = FixtureGuard::new(dir.path());
            guard.write("new.ts", "x").unwrap()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_prepare_removes_stale_file() {
        let dir = TempDir::new().unwrap();
        let stale = dir.path().join("new.ts");
        std::fs::write(&stale, "left over").unwrap();

        let guard = FixtureGuard::new(dir.path());
        guard.prepare(&["new.ts"]).unwrap();
        assert!(!stale.exists());
        assert_eq!(guard.tracked(), vec![stale]);
    }

    #[test]
    fn test_prepare_missing_file_is_ok() {
        let dir = TempDir::new().unwrap();
        let guard = FixtureGuard::new(dir.path());
        guard.prepare(&["never/existed.ts"]).unwrap();
    }

    #[test]
    fn test_remove_missing_file_is_ok() {
        let dir = TempDir::new().unwrap();
        let guard = FixtureGuard::new(dir.path());
        guard.remove("ghost.ts").unwrap();
    }

    #[test]
    fn test_tracking_is_deduplicated() {
        let dir = TempDir::new().unwrap();
        let guard = FixtureGuard::new(dir.path());
        guard.prepare(&["new.ts"]).unwrap();
        guard.write("new.ts", "a").unwrap();
        guard.write("new.ts", "b").unwrap();
        assert_eq!(guard.tracked().len(), 1);
    }

    #[test]
    fn test_absolute_path_passes_through() {
        let dir = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let guard = FixtureGuard::new(dir.path());
        let abs = other.path().join("abs.ts");
        assert_eq!(guard.resolve(&abs), abs);
    }
}
