//! On-disk storage of bare repository mirrors
//!
//! One mirror per distinct repository URL lives under a shared root, in a
//! directory named by [`escape_url`]. Mirrors survive across runs and are
//! fetched into rather than re-cloned.
//!
//! Every clone of a [`MirrorStore`] shares one lock table, and
//! [`MirrorStore::with_mirror`] holds the URL's lock for the whole closure,
//! so fetch/verify/checkout sequences against the same mirror are
//! serialized within a process. Two *processes* using the same root are not
//! coordinated: callers running several processes must serialize them
//! themselves (for example one process per origin URL).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{Error, Result};
use crate::path::{escape_url, unescape_url};

/// A mirror directory found under the store root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorEntry {
    /// Directory name (the escaped URL)
    pub name: String,
    /// Repository URL, when the name decodes
    pub url: Option<String>,
    /// Full path of the mirror
    pub path: PathBuf,
}

/// Root directory of all mirrors plus the per-URL lock registry.
#[derive(Debug, Clone)]
pub struct MirrorStore {
    root: PathBuf,
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl MirrorStore {
    /// A relative `root` is anchored at the current directory, since git
    /// runs with other working directories.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            root: std::path::absolute(&root).unwrap_or(root),
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the mirror for `url`. Does not check that it exists.
    pub fn mirror_path(&self, url: &str) -> PathBuf {
        self.root.join(escape_url(url))
    }

    /// Create the storage root (and parents) if missing.
    pub fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|e| {
            Error::repo_with_source(
                format!(
                    "Cannot create repository storage '{}': {}",
                    self.root.display(),
                    e
                ),
                e,
            )
        })
    }

    /// Run `f` with the mirror path for `url` while holding that URL's lock.
    pub fn with_mirror<T, F>(&self, url: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Path) -> Result<T>,
    {
        let lock = self.lock_for(url);
        // The lock guards no data, so a panic in another holder leaves
        // nothing inconsistent behind.
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        f(&self.mirror_path(url))
    }

    fn lock_for(&self, url: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(url.to_string()).or_default())
    }

    /// All mirror directories under the root, sorted by name. A missing
    /// root yields an empty list.
    pub fn list(&self) -> Result<Vec<MirrorEntry>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            entries.push(MirrorEntry {
                url: unescape_url(&name),
                name,
                path: entry.path(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Delete the mirror for `url`, returning whether one existed.
    pub fn remove(&self, url: &str) -> Result<bool> {
        self.with_mirror(url, |path| {
            if !path.exists() {
                return Ok(false);
            }
            fs::remove_dir_all(path)?;
            Ok(true)
        })
    }
}
