//! # Error Handling
//!
//! This module defines the error types surfaced by `repo-migrate`. Every
//! failure reaches the caller as one of two kinds:
//!
//! - **`Error::ConfigValidation`**: the supplied configuration cannot be used
//!   for this run (an exclusion path escaping the workdir, a malformed config
//!   file, an invalid glob or regex). Detected before anything destructive
//!   happens for that particular check.
//!
//! - **`Error::Repo`**: a runtime failure while talking to a repository or
//!   while enforcing the workflow's own runtime invariants (subprocess
//!   failure, unresolvable reference, nothing deleted by the exclusions, a
//!   missing resume label, a failed transformation).
//!
//! Subprocess failures are carried structurally in [`GitError`], whose
//! [`ErrorKind`] is produced by [`crate::git::classify_failure`] instead of
//! matching on error message text further up the stack. The underlying
//! cause is always kept as the `source` of the `Repo` variant so that the
//! final message can show it.

use std::path::PathBuf;

use thiserror::Error;

/// Boxed underlying cause carried by [`Error::Repo`].
pub type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for repo-migrate operations
#[derive(Error, Debug)]
pub enum Error {
    /// The configuration is structurally invalid for this run.
    #[error("{message}")]
    ConfigValidation { message: String },

    /// A failure interacting with a repository or enforcing a workflow
    /// runtime invariant.
    #[error("{message}")]
    Repo {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },
}

impl Error {
    /// Build a `ConfigValidation` error from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
        }
    }

    /// Build a `Repo` error with no underlying cause.
    pub fn repo(message: impl Into<String>) -> Self {
        Error::Repo {
            message: message.into(),
            source: None,
        }
    }

    /// Build a `Repo` error that preserves its underlying cause.
    pub fn repo_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Repo {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Whether this is a configuration error.
    pub fn is_config_validation(&self) -> bool {
        matches!(self, Error::ConfigValidation { .. })
    }

    /// Whether this is a repository/runtime error.
    pub fn is_repo(&self) -> bool {
        matches!(self, Error::Repo { .. })
    }

    /// The structured git failure behind this error, if there is one.
    pub fn git_error(&self) -> Option<&GitError> {
        match self {
            Error::Repo {
                source: Some(source),
                ..
            } => source.downcast_ref::<GitError>(),
            _ => None,
        }
    }
}

/// Classification of a failed invocation of the version-control tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// `pathspec '<name>' did not match any file(s)`
    RefNotFound { reference: String },
    /// `Needed a single revision` from `rev-parse --verify`
    NeedSingleRevision,
    /// The process was killed after exceeding the configured timeout.
    TimedOut,
    /// The executable could not be started at all.
    Spawn,
    /// Any other non-zero exit.
    Other,
}

/// A failed invocation of the version-control executable.
#[derive(Error, Debug, Clone)]
#[error("{}", self.render())]
pub struct GitError {
    /// Executable that was run (e.g. `git`)
    pub executable: String,
    /// Arguments passed to the executable
    pub args: Vec<String>,
    /// Directory the executable was started in
    pub cwd: PathBuf,
    /// Exit code, if the process exited normally
    pub exit_code: Option<i32>,
    /// Full standard error output
    pub stderr: String,
    /// What went wrong
    pub kind: ErrorKind,
}

impl GitError {
    fn render(&self) -> String {
        match &self.kind {
            ErrorKind::RefNotFound { reference } => {
                format!("Cannot find reference '{}'", reference)
            }
            ErrorKind::NeedSingleRevision => format!(
                "Error on git command '{}': {}",
                self.args.join(" "),
                self.stderr.trim_end()
            ),
            ErrorKind::TimedOut => format!(
                "'{} {}' timed out and was killed. Stderr: \n{}",
                self.executable,
                self.args.join(" "),
                self.stderr
            ),
            ErrorKind::Spawn => format!(
                "Cannot start '{} {}' in '{}': {}",
                self.executable,
                self.args.join(" "),
                self.cwd.display(),
                self.stderr.trim_end()
            ),
            ErrorKind::Other => format!(
                "Error executing '{}' ({}): {}. Stderr: \n{}",
                self.executable,
                self.args.join(" "),
                self.exit_context(),
                self.stderr
            ),
        }
    }

    fn exit_context(&self) -> String {
        match self.exit_code {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

impl From<GitError> for Error {
    fn from(err: GitError) -> Self {
        Error::Repo {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::repo_with_source(format!("I/O error: {}", err), err)
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::config(format!("Configuration parsing error: {}", err))
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::config(format!("Regex error: {}", err))
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
