//! Temporary files registry.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use log;

/// Registry of temporary files created but not yet deleted.
///
/// Cloning the registry produces a handle to the same set, so spill workers and merge sources
/// report to the sorter that created them. After a successful sort the registry is empty;
/// after a failure [`TempRegistry::purge`] removes whatever is left.
#[derive(Clone, Default, Debug)]
pub struct TempRegistry {
    paths: Arc<Mutex<BTreeSet<PathBuf>>>,
}

impl TempRegistry {
    pub fn new() -> Self {
        TempRegistry::default()
    }

    pub fn register(&self, path: &Path) {
        self.lock().insert(path.to_path_buf());
    }

    /// Forgets the path. Returns `false` if it was not registered.
    pub fn unregister(&self, path: &Path) -> bool {
        self.lock().remove(path)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.lock().iter().cloned().collect()
    }

    /// Deletes all registered files on a best-effort basis. Files that are already gone are
    /// not an error. Returns the number of files removed.
    pub fn purge(&self) -> usize {
        let paths = std::mem::take(&mut *self.lock());
        let mut removed = 0;

        for path in paths {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => log::warn!("temporary file {} not removed: {}", path.display(), err),
            }
        }

        return removed;
    }

    fn lock(&self) -> MutexGuard<'_, BTreeSet<PathBuf>> {
        // the set stays consistent even if a holder panicked
        self.paths.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
