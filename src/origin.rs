//! Origins: where migrated changes come from
//!
//! An [`Origin`] produces [`Change`]s in its own chronological order and can
//! materialize the tree of any one of them into a directory. [`GitOrigin`]
//! is the implementation backed by a [`GitRepository`] mirror.

use std::fmt;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use crate::error::Result;
use crate::git::GitRepository;

/// Label under which git origin revisions are recorded in destinations.
pub const GIT_ORIGIN_LABEL: &str = "GitOrigin-RevId";

/// One origin-side revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    /// Opaque revision identifier; the identity of the change
    pub reference: String,
    /// Seconds since the Unix epoch, when the origin knows it
    pub timestamp: Option<i64>,
    /// Human-readable description
    pub summary: String,
}

impl Change {
    pub fn new(reference: impl Into<String>, timestamp: Option<i64>, summary: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            timestamp,
            summary: summary.into(),
        }
    }
}

/// Lazy, finite, origin-ordered sequence of changes.
///
/// Each item is resolved on demand, so long histories are never held in
/// memory as full `Change` records.
pub type Changes<'a> = Box<dyn Iterator<Item = Result<Change>> + 'a>;

/// Source repository abstraction.
pub trait Origin: fmt::Debug {
    /// Label that destinations use to record the last migrated revision of
    /// this kind of origin.
    fn label_name(&self) -> &str;

    /// The change identified by `reference`.
    fn resolve(&self, reference: &str) -> Result<Change>;

    /// Changes strictly after `previous_ref` up to and including
    /// `source_ref`, oldest first. Without `previous_ref`, just the change
    /// at `source_ref`.
    fn changes_between(&self, previous_ref: Option<&str>, source_ref: &str)
        -> Result<Changes<'_>>;

    /// Write the tree of `change` into `workdir`, replacing its contents.
    fn materialize(&self, change: &Change, workdir: &Path) -> Result<()>;

    /// The current tip reference.
    fn head(&self) -> Result<String>;
}

/// Origin reading from a git repository through its local mirror.
///
/// The mirror is fetched once, on first use, and all later queries of the
/// same `GitOrigin` read the fetched state.
pub struct GitOrigin {
    repository: GitRepository,
    default_ref: String,
    fetched: Mutex<bool>,
}

impl GitOrigin {
    /// `default_ref` is what [`Origin::head`] resolves, e.g. `origin/main`.
    pub fn new(repository: GitRepository, default_ref: impl Into<String>) -> Self {
        Self {
            repository,
            default_ref: default_ref.into(),
            fetched: Mutex::new(false),
        }
    }

    pub fn repository(&self) -> &GitRepository {
        &self.repository
    }

    fn ensure_fetched(&self) -> Result<()> {
        let mut fetched = self.fetched.lock().unwrap_or_else(PoisonError::into_inner);
        if !*fetched {
            self.repository.fetch()?;
            *fetched = true;
        }
        Ok(())
    }

    fn change_at(&self, reference: &str) -> Result<Change> {
        let info = self.repository.commit_info(reference)?;
        Ok(Change::new(info.sha, Some(info.timestamp), info.message))
    }
}

impl Origin for GitOrigin {
    fn label_name(&self) -> &str {
        GIT_ORIGIN_LABEL
    }

    fn resolve(&self, reference: &str) -> Result<Change> {
        self.ensure_fetched()?;
        self.change_at(reference)
    }

    fn changes_between(
        &self,
        previous_ref: Option<&str>,
        source_ref: &str,
    ) -> Result<Changes<'_>> {
        self.ensure_fetched()?;
        let shas = match previous_ref {
            Some(previous) => self.repository.rev_list(Some(previous), source_ref)?,
            None => vec![self.repository.resolve(source_ref)?],
        };
        Ok(Box::new(shas.into_iter().map(move |sha| self.change_at(&sha))))
    }

    fn materialize(&self, change: &Change, workdir: &Path) -> Result<()> {
        self.ensure_fetched()?;
        self.repository.checkout(&change.reference, workdir)
    }

    fn head(&self) -> Result<String> {
        self.ensure_fetched()?;
        self.repository.resolve(&self.default_ref)
    }
}

impl fmt::Debug for GitOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitOrigin")
            .field("url", &self.repository.url())
            .field("ref", &self.default_ref)
            .finish()
    }
}
