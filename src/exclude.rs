//! Exclusion filtering of a materialized working tree
//!
//! Runs after the origin has materialized a change and before any
//! transformation sees the tree. Purely path based: file contents are never
//! read.
//!
//! Directories are never deleted. A pattern naming a directory without a
//! recursive `/**` suffix matches nothing, and a pass in which no pattern
//! matched anything fails with "Nothing was deleted" so that stale exclusion
//! config is noticed.

use crate::error::{Error, Result};
use crate::path::{resolve_within, PathMatcher};
use log::debug;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// An ordered set of exclusion patterns as configured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionFilter {
    patterns: Vec<String>,
}

impl ExclusionFilter {
    /// Build a filter, checking that every pattern is valid glob syntax.
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
        for pattern in &patterns {
            PathMatcher::new(pattern)?;
        }
        Ok(Self { patterns })
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Resolve every pattern against `workdir`, failing on the first one
    /// that escapes it. Nothing is touched on disk.
    pub fn resolve(&self, workdir: &Path) -> Result<Vec<PathMatcher>> {
        self.patterns
            .iter()
            .map(|pattern| {
                let relative = resolve_within(workdir, pattern)?;
                PathMatcher::new(&relative.to_string_lossy())
            })
            .collect()
    }

    /// Files under `workdir` matched by at least one pattern, relative to
    /// `workdir`. A top-level `.git` entry is never considered.
    pub fn matching_files(&self, workdir: &Path) -> Result<BTreeSet<PathBuf>> {
        let matchers = self.resolve(workdir)?;
        let mut matched = BTreeSet::new();
        if matchers.is_empty() {
            return Ok(matched);
        }

        let walker = WalkDir::new(workdir)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| !(e.depth() == 1 && e.file_name() == ".git"));
        for entry in walker {
            let entry = entry.map_err(|e| {
                Error::repo(format!(
                    "Cannot walk workdir '{}': {}",
                    workdir.display(),
                    e
                ))
            })?;
            if entry.file_type().is_dir() {
                continue;
            }
            let relative = match entry.path().strip_prefix(workdir) {
                Ok(relative) => relative,
                Err(_) => continue,
            };
            if matchers.iter().any(|m| m.matches(relative)) {
                matched.insert(relative.to_path_buf());
            }
        }
        Ok(matched)
    }

    /// Delete every matched file under `workdir` and return how many were
    /// removed.
    ///
    /// All patterns are validated before the first deletion. With no
    /// patterns configured this is a no-op returning 0.
    pub fn apply(&self, workdir: &Path) -> Result<usize> {
        if self.is_empty() {
            return Ok(0);
        }
        let matched = self.matching_files(workdir)?;
        if matched.is_empty() {
            return Err(Error::repo(format!(
                "Nothing was deleted in '{}' by exclusion patterns {:?}",
                workdir.display(),
                self.patterns
            )));
        }
        for relative in &matched {
            let path = workdir.join(relative);
            debug!("Excluding {}", relative.display());
            fs::remove_file(&path).map_err(|e| {
                Error::repo_with_source(format!("Cannot delete '{}'", path.display()), e)
            })?;
        }
        Ok(matched.len())
    }
}

impl fmt::Display for ExclusionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.patterns.join(", "))
    }
}
