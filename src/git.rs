//! Git repository access through a persistent bare mirror
//!
//! [`GitRepository`] turns a remote URL plus a revision into a materialized
//! working tree:
//!
//! 1. the mirror directory is the percent-escaped URL under the
//!    [`MirrorStore`] root, which is created if missing;
//! 2. a missing mirror is created with `git init --bare` and the URL is
//!    registered as its only remote, `origin`;
//! 3. the mirror is refreshed with `git fetch -f origin`. No local branch is
//!    ever created to track the remote, fetched state is only reached through
//!    explicit references such as `origin/main`;
//! 4. the reference is verified with `rev-parse --verify`;
//! 5. the tree is force-checked-out into the caller's workdir.
//!
//! All of this happens under the mirror's lock. The system `git` command is
//! used, so SSH keys, credential helpers and `~/.gitconfig` apply as usual.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use log::{debug, warn};
use regex::Regex;

use crate::command::{CommandRunner, CommandStatus, SystemCommandRunner};
use crate::error::{Error, ErrorKind, GitError, Result};
use crate::mirror::MirrorStore;

/// Name under which the URL is registered in every mirror.
pub const REMOTE_NAME: &str = "origin";

fn ref_not_found_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"pathspec '(.+)' did not match any file").expect("static regex is valid")
    })
}

/// Classify the standard error of a failed git invocation.
pub fn classify_failure(stderr: &str) -> ErrorKind {
    if let Some(captures) = ref_not_found_pattern().captures(stderr) {
        return ErrorKind::RefNotFound {
            reference: captures[1].to_string(),
        };
    }
    if stderr.contains("Needed a single revision") {
        return ErrorKind::NeedSingleRevision;
    }
    ErrorKind::Other
}

/// Metadata of a single commit, as read from the mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub sha: String,
    pub timestamp: i64,
    pub message: String,
}

/// A remote git repository accessed through its local mirror.
#[derive(Clone)]
pub struct GitRepository {
    url: String,
    git_executable: String,
    mirrors: MirrorStore,
    runner: Arc<dyn CommandRunner>,
}

impl GitRepository {
    /// A repository using the `git` on `PATH` with no command timeout.
    pub fn new(url: impl Into<String>, mirrors: MirrorStore) -> Self {
        Self::with_runner(url, mirrors, "git", Arc::new(SystemCommandRunner::new()))
    }

    /// A repository with an explicit executable and command runner.
    pub fn with_runner(
        url: impl Into<String>,
        mirrors: MirrorStore,
        git_executable: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            url: url.into(),
            git_executable: git_executable.into(),
            mirrors,
            runner,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn mirror_path(&self) -> PathBuf {
        self.mirrors.mirror_path(&self.url)
    }

    /// Materialize `reference` into `workdir`, refreshing the mirror first.
    ///
    /// Any content already in `workdir` is overwritten.
    pub fn checkout_reference(&self, reference: &str, workdir: &Path) -> Result<()> {
        self.mirrors.with_mirror(&self.url, |mirror| {
            self.prepare_and_fetch(mirror)?;
            self.checkout_in(mirror, reference, workdir)
        })
    }

    /// Create the mirror if needed and fetch into it.
    pub fn fetch(&self) -> Result<()> {
        self.mirrors
            .with_mirror(&self.url, |mirror| self.prepare_and_fetch(mirror))
    }

    /// Check out `reference` from the already-fetched mirror.
    pub fn checkout(&self, reference: &str, workdir: &Path) -> Result<()> {
        self.mirrors
            .with_mirror(&self.url, |mirror| self.checkout_in(mirror, reference, workdir))
    }

    /// Resolve `reference` to a full commit id in the mirror.
    pub fn resolve(&self, reference: &str) -> Result<String> {
        self.mirrors
            .with_mirror(&self.url, |mirror| self.verify_ref(mirror, reference))
    }

    /// Commit ids strictly after `from` up to and including `to`, oldest
    /// first, following first parents only. Without `from`, the whole
    /// first-parent history of `to`.
    pub fn rev_list(&self, from: Option<&str>, to: &str) -> Result<Vec<String>> {
        self.mirrors.with_mirror(&self.url, |mirror| {
            self.verify_ref(mirror, to)?;
            let range = match from {
                Some(from) => {
                    self.verify_ref(mirror, from)?;
                    format!("{}..{}", from, to)
                }
                None => to.to_string(),
            };
            let stdout = self.git(mirror, &["rev-list", "--reverse", "--first-parent", range.as_str()])?;
            Ok(stdout.lines().map(str::to_string).collect())
        })
    }

    /// Timestamp and full message of `reference`.
    pub fn commit_info(&self, reference: &str) -> Result<CommitInfo> {
        self.mirrors.with_mirror(&self.url, |mirror| {
            let sha = self.verify_ref(mirror, reference)?;
            let stdout = self.git(mirror, &["log", "-1", "--format=%ct%n%B", sha.as_str()])?;
            let (timestamp, message) = stdout.split_once('\n').unwrap_or((stdout.as_str(), ""));
            let timestamp = timestamp.trim().parse::<i64>().map_err(|e| {
                Error::repo(format!(
                    "Cannot parse commit time '{}' of {}: {}",
                    timestamp.trim(),
                    sha,
                    e
                ))
            })?;
            Ok(CommitInfo {
                sha,
                timestamp,
                message: message.trim_end().to_string(),
            })
        })
    }

    fn prepare_and_fetch(&self, mirror: &Path) -> Result<()> {
        self.mirrors.ensure_root()?;
        if !mirror.exists() {
            self.create_mirror(mirror)?;
        }
        self.git(mirror, &["fetch", "-f", REMOTE_NAME])?;
        Ok(())
    }

    fn create_mirror(&self, mirror: &Path) -> Result<()> {
        debug!("Creating mirror of {} at {}", self.url, mirror.display());
        let mirror_str = mirror.to_string_lossy();
        self.git(self.mirrors.root(), &["init", "--bare", &*mirror_str])?;
        if let Err(err) = self.git(mirror, &["remote", "add", REMOTE_NAME, self.url.as_str()]) {
            // A mirror without its remote would only fail later on fetch.
            if let Err(cleanup) = fs::remove_dir_all(mirror) {
                warn!(
                    "Cannot remove half-created mirror {}: {}",
                    mirror.display(),
                    cleanup
                );
            }
            return Err(err);
        }
        Ok(())
    }

    fn checkout_in(&self, mirror: &Path, reference: &str, workdir: &Path) -> Result<()> {
        self.verify_ref(mirror, reference)?;
        // git resolves --work-tree against its own cwd
        let workdir = std::path::absolute(workdir).map_err(|e| {
            Error::repo_with_source(
                format!("Cannot resolve workdir '{}'", workdir.display()),
                e,
            )
        })?;
        let workdir = workdir.as_path();
        fs::create_dir_all(workdir).map_err(|e| {
            Error::repo_with_source(
                format!("Cannot create workdir '{}'", workdir.display()),
                e,
            )
        })?;
        let git_dir = format!("--git-dir={}", mirror.display());
        let work_tree = format!("--work-tree={}", workdir.display());
        self.git(
            workdir,
            &[git_dir.as_str(), work_tree.as_str(), "checkout", "-f", reference],
        )?;
        Ok(())
    }

    fn verify_ref(&self, mirror: &Path, reference: &str) -> Result<String> {
        let spec = format!("{}^{{commit}}", reference);
        match self.git(mirror, &["rev-parse", "--verify", "--end-of-options", spec.as_str()]) {
            Ok(stdout) => Ok(stdout.trim().to_string()),
            Err(err) => {
                let needs_hint = err
                    .git_error()
                    .is_some_and(|g| g.kind == ErrorKind::NeedSingleRevision);
                match err {
                    Error::Repo { source, .. } if needs_hint => Err(Error::Repo {
                        message: format!(
                            "Ref '{}' does not exist. If you used a ref like '{}' you should be using '{}/{}' instead",
                            reference, reference, REMOTE_NAME, reference
                        ),
                        source,
                    }),
                    other => Err(other),
                }
            }
        }
    }

    /// Run git in `cwd` and return its standard output.
    pub fn git(&self, cwd: &Path, args: &[&str]) -> Result<String> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        debug!("{} {} (in {})", self.git_executable, args.join(" "), cwd.display());

        let output = self
            .runner
            .run(&self.git_executable, &args, cwd)
            .map_err(|e| GitError {
                executable: self.git_executable.clone(),
                args: args.clone(),
                cwd: cwd.to_path_buf(),
                exit_code: None,
                stderr: e.to_string(),
                kind: ErrorKind::Spawn,
            })?;

        if output.is_success() {
            return Ok(output.stdout);
        }
        let kind = match output.status {
            CommandStatus::TimedOut => ErrorKind::TimedOut,
            CommandStatus::Exited(_) | CommandStatus::Signaled => {
                classify_failure(&output.stderr)
            }
        };
        Err(GitError {
            executable: self.git_executable.clone(),
            cwd: cwd.to_path_buf(),
            exit_code: output.exit_code(),
            args,
            stderr: output.stderr,
            kind,
        }
        .into())
    }
}

impl fmt::Debug for GitRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitRepository")
            .field("url", &self.url)
            .field("git_executable", &self.git_executable)
            .field("mirror_root", &self.mirrors.root())
            .finish()
    }
}
