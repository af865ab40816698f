//! # Configuration Schema and Parsing
//!
//! This module defines the structure of the `repo-migrate.yaml` file and
//! turns it into a runnable [`Workflow`].
//!
//! ```yaml
//! name: public-export
//! mode: iterative
//! origin:
//!   git:
//!     url: https://example.com/internal.git
//!     ref: origin/main
//! destination:
//!   folder:
//!     path: ./public
//! exclude:
//!   - "internal/**"
//! transformations:
//!   - replace:
//!       before: "${line}"
//!       after: "PUBLIC ${line}"
//!       regex_groups: { line: ".+" }
//! ```
//!
//! Parsing only checks structure. [`WorkflowConfig::build`] compiles every
//! pattern and template, so a config that builds is valid up to the
//! workdir-dependent checks done at run time.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::{CommandRunner, SystemCommandRunner};
use crate::defaults;
use crate::destination::FolderDestination;
use crate::error::{Error, Result};
use crate::exclude::ExclusionFilter;
use crate::git::GitRepository;
use crate::mirror::MirrorStore;
use crate::origin::GitOrigin;
use crate::transform::Replace;
use crate::workflow::{Workflow, WorkflowMode, DEFAULT_NAME};

/// Git origin configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GitOriginOp {
    /// Remote URL of the repository
    pub url: String,
    /// Reference migrated when none is given on the command line. Must be
    /// remote-qualified, e.g. `origin/main`.
    #[serde(default = "default_ref")]
    pub r#ref: String,
}

/// Folder destination configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FolderDestinationOp {
    /// Directory receiving the migrated tree
    pub path: PathBuf,
}

/// Replace transformation configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ReplaceOp {
    /// Template to search for; `${name}` placeholders bind `regex_groups`
    pub before: String,
    /// Replacement template; may only use placeholders from `before`
    pub after: String,
    #[serde(default)]
    pub regex_groups: BTreeMap<String, String>,
    /// Glob restricting which files are rewritten
    #[serde(default)]
    pub path: Option<String>,
    /// Fail when nothing matched (default `true`)
    #[serde(default = "default_required")]
    pub required: bool,
}

/// Where changes are read from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum OriginConfig {
    Git { git: GitOriginOp },
}

/// Where changes are written to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum DestinationConfig {
    Folder { folder: FolderDestinationOp },
}

/// One step of the transformation chain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TransformationConfig {
    Replace { replace: ReplaceOp },
}

/// The whole configuration file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WorkflowConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub mode: WorkflowMode,
    pub origin: OriginConfig,
    pub destination: DestinationConfig,
    /// Origin paths deleted before transformations run
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Applied in order
    #[serde(default)]
    pub transformations: Vec<TransformationConfig>,
}

fn default_name() -> String {
    DEFAULT_NAME.to_string()
}

fn default_ref() -> String {
    "origin/main".to_string()
}

fn default_required() -> bool {
    true
}

/// Runtime settings that do not belong in the config file.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Root of the mirror storage
    pub mirror_root: PathBuf,
    /// Git executable to invoke
    pub git_executable: String,
    /// Resume iterative runs after this reference
    pub previous_ref: Option<String>,
    /// Kill git invocations running longer than this
    pub timeout: Option<Duration>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            mirror_root: defaults::default_mirror_root(),
            git_executable: defaults::DEFAULT_GIT.to_string(),
            previous_ref: None,
            timeout: None,
        }
    }
}

/// Parses a YAML string into a [`WorkflowConfig`].
pub fn parse(yaml_content: &str) -> Result<WorkflowConfig> {
    Ok(serde_yaml::from_str(yaml_content)?)
}

/// Reads and parses a config file.
pub fn from_file(path: &Path) -> Result<WorkflowConfig> {
    let content = fs::read_to_string(path).map_err(|e| {
        Error::config(format!("Cannot read config file '{}': {}", path.display(), e))
    })?;
    parse(&content)
}

impl WorkflowConfig {
    /// Reference migrated when the caller does not name one.
    pub fn default_source_ref(&self) -> &str {
        match &self.origin {
            OriginConfig::Git { git } => &git.r#ref,
        }
    }

    /// Compile the configuration into a runnable workflow. No I/O happens
    /// here; mirrors and destinations are only touched by [`Workflow::run`].
    pub fn build(&self, options: &BuildOptions) -> Result<Workflow> {
        let runner: Arc<dyn CommandRunner> = Arc::new(match options.timeout {
            Some(timeout) => SystemCommandRunner::with_timeout(timeout),
            None => SystemCommandRunner::new(),
        });
        let mirrors = MirrorStore::new(&options.mirror_root);

        let origin = match &self.origin {
            OriginConfig::Git { git } => {
                if git.url.trim().is_empty() {
                    return Err(Error::config("origin.git.url must not be empty"));
                }
                // Local paths are accepted as-is; anything with a scheme must parse
                if git.url.contains("://") {
                    url::Url::parse(&git.url).map_err(|e| {
                        Error::config(format!("origin.git.url '{}' is not a valid URL: {}", git.url, e))
                    })?;
                }
                let repository = GitRepository::with_runner(
                    &git.url,
                    mirrors,
                    &options.git_executable,
                    runner,
                );
                GitOrigin::new(repository, &git.r#ref)
            }
        };
        let destination = match &self.destination {
            DestinationConfig::Folder { folder } => FolderDestination::new(&folder.path),
        };

        let mut workflow = Workflow::new(Box::new(origin), Box::new(destination))
            .with_name(&self.name)
            .with_mode(self.mode)
            .with_exclusions(ExclusionFilter::new(&self.exclude)?);
        for transformation in &self.transformations {
            match transformation {
                TransformationConfig::Replace { replace } => {
                    let mut step = Replace::new(&replace.before, &replace.after, &replace.regex_groups)?
                        .required(replace.required);
                    if let Some(path) = &replace.path {
                        step = step.with_paths(path)?;
                    }
                    workflow = workflow.with_transformation(Box::new(step));
                }
            }
        }
        if let Some(previous) = &options.previous_ref {
            workflow = workflow.with_previous_ref(previous);
        }
        Ok(workflow)
    }
}
