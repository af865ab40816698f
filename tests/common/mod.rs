//! Shared test utilities for integration and E2E tests.
//!
//! Provides in-memory test doubles for the workflow collaborators
//! ([`DummyOrigin`], [`RecordingDestination`]) and a [`TestFixture`] for
//! driving the CLI binary.
//!
//! ## Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! let origin = DummyOrigin::new();
//! origin.add_simple_change(42);
//! ```

use assert_fs::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use repo_migrate::destination::{ChangeMetadata, Destination};
use repo_migrate::error::{Error, Result};
use repo_migrate::origin::{Change, Changes, Origin};

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    #[allow(unused_imports)]
    pub use assert_cmd::cargo::cargo_bin_cmd;
    #[allow(unused_imports)]
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use assert_fs::TempDir;
    #[allow(unused_imports)]
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::configs;
    #[allow(unused_imports)]
    pub use super::{DummyOrigin, ProcessedChange, RecordingDestination, TestFixture};
}

/// Common configuration YAML snippets for testing.
#[allow(dead_code)]
pub mod configs {
    /// Squash workflow from an unreachable origin into `out/`.
    pub const MINIMAL: &str = r#"
origin:
  git:
    url: https://example.invalid/repo.git
destination:
  folder:
    path: out
"#;

    /// Every optional section filled in.
    pub const FULL: &str = r#"
name: public-export
mode: iterative
origin:
  git:
    url: https://example.invalid/internal.git
    ref: origin/release
destination:
  folder:
    path: out
exclude:
  - "internal/**"
transformations:
  - replace:
      before: "${line}"
      after: "PUBLIC ${line}"
      regex_groups:
        line: ".+"
"#;

    /// Invalid YAML for error testing.
    pub const INVALID_YAML: &str = "origin: [unclosed";

    /// Parses, but an exclusion escapes the workdir.
    pub const ESCAPING_EXCLUDE: &str = r#"
origin:
  git:
    url: https://example.invalid/repo.git
destination:
  folder:
    path: out
exclude:
  - "../../../file"
"#;
}

#[derive(Debug, Clone)]
enum Tree {
    /// `file.txt` holding the change reference
    Simple,
    /// A copy of a directory
    Copy(PathBuf),
}

#[derive(Debug, Clone)]
struct DummyChange {
    change: Change,
    tree: Tree,
}

/// In-memory origin. References are the change index, `"0"`, `"1"`, ...
///
/// Clones share the same history, so a test can keep a handle after moving
/// one into a workflow.
#[derive(Debug, Clone, Default)]
pub struct DummyOrigin {
    changes: Arc<Mutex<Vec<DummyChange>>>,
}

#[allow(dead_code)]
impl DummyOrigin {
    pub const LABEL: &'static str = "Dummy-RevId";

    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, timestamp: Option<i64>, summary: Option<&str>, tree: Tree) -> String {
        let mut changes = self.changes.lock().unwrap();
        let reference = changes.len().to_string();
        let summary = summary
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} change\n", reference));
        changes.push(DummyChange {
            change: Change::new(reference.clone(), timestamp, summary),
            tree,
        });
        reference
    }

    /// Add a change whose tree is a single `file.txt` holding its reference.
    pub fn add_simple_change(&self, timestamp: i64) -> String {
        self.push(Some(timestamp), None, Tree::Simple)
    }

    /// Like [`Self::add_simple_change`] but without a timestamp.
    pub fn add_untimed_change(&self) -> String {
        self.push(None, None, Tree::Simple)
    }

    /// Add a change whose tree is a copy of `base`.
    pub fn add_change(&self, timestamp: i64, base: &Path, summary: &str) -> String {
        self.push(Some(timestamp), Some(summary), Tree::Copy(base.to_path_buf()))
    }

    fn index(&self, reference: &str) -> Result<usize> {
        let len = self.changes.lock().unwrap().len();
        reference
            .parse::<usize>()
            .ok()
            .filter(|&i| i < len)
            .ok_or_else(|| Error::repo(format!("Cannot find reference '{}'", reference)))
    }
}

impl Origin for DummyOrigin {
    fn label_name(&self) -> &str {
        Self::LABEL
    }

    fn resolve(&self, reference: &str) -> Result<Change> {
        let index = self.index(reference)?;
        Ok(self.changes.lock().unwrap()[index].change.clone())
    }

    fn changes_between(&self, previous_ref: Option<&str>, source_ref: &str) -> Result<Changes<'_>> {
        let to = self.index(source_ref)?;
        let from = match previous_ref {
            Some(previous) => self.index(previous)? + 1,
            None => to,
        };
        Ok(Box::new(
            (from..=to).map(move |i| self.resolve(&i.to_string())),
        ))
    }

    fn materialize(&self, change: &Change, workdir: &Path) -> Result<()> {
        let index = self.index(&change.reference)?;
        let tree = self.changes.lock().unwrap()[index].tree.clone();
        fs::create_dir_all(workdir)?;
        match tree {
            Tree::Simple => fs::write(workdir.join("file.txt"), &change.reference)?,
            Tree::Copy(base) => copy_dir(&base, workdir)?,
        }
        Ok(())
    }

    fn head(&self) -> Result<String> {
        let len = self.changes.lock().unwrap().len();
        match len {
            0 => Err(Error::repo("Origin has no changes")),
            n => Ok((n - 1).to_string()),
        }
    }
}

fn copy_dir(from: &Path, to: &Path) -> std::io::Result<()> {
    for entry in walkdir::WalkDir::new(from).min_depth(1) {
        let entry = entry?;
        let target = to.join(entry.path().strip_prefix(from).unwrap());
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// What a [`RecordingDestination`] saw for one `process` call.
#[derive(Debug, Clone)]
pub struct ProcessedChange {
    pub metadata: ChangeMetadata,
    /// Workdir-relative path to file content at the time of the call
    pub workdir: BTreeMap<PathBuf, String>,
}

/// Destination recording every processed change in memory.
///
/// `previous_ref` answers with the last recorded reference for the label.
#[derive(Debug, Clone, Default)]
pub struct RecordingDestination {
    processed: Arc<Mutex<Vec<ProcessedChange>>>,
}

#[allow(dead_code)]
impl RecordingDestination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn processed(&self) -> Vec<ProcessedChange> {
        self.processed.lock().unwrap().clone()
    }
}

impl Destination for RecordingDestination {
    fn process(&self, metadata: &ChangeMetadata, workdir: &Path) -> Result<()> {
        let mut snapshot = BTreeMap::new();
        for entry in walkdir::WalkDir::new(workdir).min_depth(1) {
            let entry = entry.map_err(|e| Error::repo(e.to_string()))?;
            if entry.file_type().is_file() {
                let relative = entry.path().strip_prefix(workdir).unwrap().to_path_buf();
                snapshot.insert(relative, fs::read_to_string(entry.path())?);
            }
        }
        self.processed.lock().unwrap().push(ProcessedChange {
            metadata: metadata.clone(),
            workdir: snapshot,
        });
        Ok(())
    }

    fn previous_ref(&self, label: &str) -> Result<Option<String>> {
        Ok(self
            .processed
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|p| p.metadata.label == label)
            .map(|p| p.metadata.origin_ref.clone()))
    }
}

/// A temporary directory with an optional `repo-migrate.yaml`.
///
/// ```rust,ignore
/// let fixture = TestFixture::new().with_config(configs::MINIMAL);
/// cargo_bin_cmd!("repo-migrate")
///     .current_dir(fixture.path())
///     .arg("validate")
///     .assert()
///     .success();
/// ```
#[allow(dead_code)]
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

#[allow(dead_code)]
impl TestFixture {
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Write `repo-migrate.yaml` with the given content.
    pub fn with_config(self, content: &str) -> Self {
        self.temp_dir
            .child("repo-migrate.yaml")
            .write_str(content)
            .expect("Failed to write config file");
        self
    }

    /// Add a file with the given path and content.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.temp_dir
            .child(path)
            .write_str(content)
            .expect("Failed to write file");
        self
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.temp_dir.path().join("repo-migrate.yaml")
    }

    pub fn child(&self, path: &str) -> assert_fs::fixture::ChildPath {
        self.temp_dir.child(path)
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
