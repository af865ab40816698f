//! Destinations: where migrated changes are committed
//!
//! A [`Destination`] accepts a materialized working tree together with the
//! metadata of the origin change it came from. Once `process` returns the
//! change is considered durably committed; the workflow never rolls it back.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Directory inside a [`FolderDestination`] that holds its own state.
pub const STATE_DIR: &str = ".repo-migrate";
const STATE_FILE: &str = "state.json";

/// What the destination is told about the change it is committing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeMetadata {
    /// Label the origin reference is recorded under (e.g. `GitOrigin-RevId`)
    pub label: String,
    /// Reference of the origin change
    pub origin_ref: String,
    /// Change summary
    pub summary: String,
    /// Seconds since the Unix epoch
    pub timestamp: i64,
}

/// Target repository abstraction.
pub trait Destination: fmt::Debug {
    /// Commit the tree under `workdir`. Durable once this returns `Ok`.
    fn process(&self, metadata: &ChangeMetadata, workdir: &Path) -> Result<()>;

    /// The last origin reference recorded under `label`, if any.
    fn previous_ref(&self, label: &str) -> Result<Option<String>>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct FolderState {
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(default)]
    last: Option<ChangeMetadata>,
}

/// Writes each processed tree into a plain directory.
///
/// Everything in the directory except [`STATE_DIR`] is replaced on every
/// `process`. The last reference per label is kept in
/// `STATE_DIR/state.json`.
#[derive(Debug, Clone)]
pub struct FolderDestination {
    path: PathBuf,
}

impl FolderDestination {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn state_path(&self) -> PathBuf {
        self.path.join(STATE_DIR).join(STATE_FILE)
    }

    fn read_state(&self) -> Result<FolderState> {
        let path = self.state_path();
        if !path.exists() {
            return Ok(FolderState::default());
        }
        let content = fs::read_to_string(&path)?;
        serde_json::from_str(&content).map_err(|e| {
            Error::repo_with_source(format!("Corrupt destination state '{}'", path.display()), e)
        })
    }

    fn write_state(&self, state: &FolderState) -> Result<()> {
        let path = self.state_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(state).map_err(|e| {
            Error::repo_with_source("Cannot serialize destination state", e)
        })?;
        fs::write(&path, content)?;
        Ok(())
    }

    fn clear_tree(&self) -> Result<()> {
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_name() == STATE_DIR {
                continue;
            }
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(entry.path())?;
            } else {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    fn copy_tree(&self, workdir: &Path) -> Result<usize> {
        let mut copied = 0;
        let walker = WalkDir::new(workdir)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| !(e.depth() == 1 && e.file_name() == ".git"));
        for entry in walker {
            let entry = entry.map_err(|e| {
                Error::repo(format!("Cannot walk workdir '{}': {}", workdir.display(), e))
            })?;
            let Ok(relative) = entry.path().strip_prefix(workdir) else {
                continue;
            };
            let target = self.path.join(relative);
            if entry.path_is_symlink() {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                copy_symlink(entry.path(), &target)?;
                copied += 1;
            } else if entry.file_type().is_dir() {
                fs::create_dir_all(&target)?;
            } else {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(entry.path(), &target)?;
                copied += 1;
            }
        }
        Ok(copied)
    }
}

/// Recreate the link at `source` as `target`, without following it.
#[cfg(unix)]
fn copy_symlink(source: &Path, target: &Path) -> Result<()> {
    let link = fs::read_link(source)?;
    std::os::unix::fs::symlink(&link, target)?;
    Ok(())
}

#[cfg(windows)]
fn copy_symlink(source: &Path, target: &Path) -> Result<()> {
    let link = fs::read_link(source)?;
    if source.is_dir() {
        std::os::windows::fs::symlink_dir(&link, target)?;
    } else {
        std::os::windows::fs::symlink_file(&link, target)?;
    }
    Ok(())
}

impl Destination for FolderDestination {
    fn process(&self, metadata: &ChangeMetadata, workdir: &Path) -> Result<()> {
        fs::create_dir_all(&self.path).map_err(|e| {
            Error::repo_with_source(
                format!("Cannot create destination folder '{}'", self.path.display()),
                e,
            )
        })?;
        self.clear_tree()?;
        let copied = self.copy_tree(workdir)?;
        debug!(
            "Copied {} files for {} into {}",
            copied,
            metadata.origin_ref,
            self.path.display()
        );

        let mut state = self.read_state()?;
        state
            .labels
            .insert(metadata.label.clone(), metadata.origin_ref.clone());
        state.last = Some(metadata.clone());
        self.write_state(&state)
    }

    fn previous_ref(&self, label: &str) -> Result<Option<String>> {
        Ok(self.read_state()?.labels.get(label).cloned())
    }
}
