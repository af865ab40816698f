//! The migration engine
//!
//! A [`Workflow`] moves changes from an [`Origin`] into a [`Destination`].
//! For each change it rebuilds the workdir from scratch, deletes excluded
//! paths, runs the transformation chain in order and hands the tree to the
//! destination.
//!
//! ## Modes
//!
//! - [`WorkflowMode::Squash`]: one destination commit for the tree at the
//!   source reference.
//! - [`WorkflowMode::Iterative`]: one destination commit per origin change
//!   after the last migrated reference, oldest first. A failure on any change
//!   stops the run; changes already handed to the destination stay there.

use std::fmt;
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::destination::{ChangeMetadata, Destination};
use crate::error::{Error, Result};
use crate::exclude::ExclusionFilter;
use crate::origin::{Change, Origin};
use crate::transform::Transformation;

/// Default workflow name.
pub const DEFAULT_NAME: &str = "default";

/// How origin changes map to destination commits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowMode {
    /// One commit for the whole range
    #[default]
    Squash,
    /// One commit per origin change
    Iterative,
}

impl fmt::Display for WorkflowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowMode::Squash => write!(f, "SQUASH"),
            WorkflowMode::Iterative => write!(f, "ITERATIVE"),
        }
    }
}

/// A configured migration, immutable once built.
#[derive(Debug)]
pub struct Workflow {
    name: String,
    origin: Box<dyn Origin>,
    destination: Box<dyn Destination>,
    transformations: Vec<Box<dyn Transformation>>,
    mode: WorkflowMode,
    exclusions: ExclusionFilter,
    previous_ref: Option<String>,
}

impl Workflow {
    pub fn new(origin: Box<dyn Origin>, destination: Box<dyn Destination>) -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            origin,
            destination,
            transformations: Vec::new(),
            mode: WorkflowMode::default(),
            exclusions: ExclusionFilter::default(),
            previous_ref: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_mode(mut self, mode: WorkflowMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_transformation(mut self, transformation: Box<dyn Transformation>) -> Self {
        self.transformations.push(transformation);
        self
    }

    pub fn with_exclusions(mut self, exclusions: ExclusionFilter) -> Self {
        self.exclusions = exclusions;
        self
    }

    /// Start iterative runs after `reference` instead of asking the
    /// destination where the last run stopped.
    pub fn with_previous_ref(mut self, reference: impl Into<String>) -> Self {
        self.previous_ref = Some(reference.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> WorkflowMode {
        self.mode
    }

    pub fn origin(&self) -> &dyn Origin {
        self.origin.as_ref()
    }

    pub fn exclusions(&self) -> &ExclusionFilter {
        &self.exclusions
    }

    /// Migrate up to and including `source_ref`, using `workdir` as the
    /// scratch tree. The workdir is exclusively owned by this call and its
    /// contents are replaced for every change.
    ///
    /// Returns the metadata of every change handed to the destination, in
    /// the order they were processed.
    pub fn run(&self, workdir: &Path, source_ref: &str) -> Result<Vec<ChangeMetadata>> {
        // Escaping patterns are rejected before anything touches the disk
        self.exclusions.resolve(workdir)?;

        info!("Running workflow '{}' in {} mode up to {}", self.name, self.mode, source_ref);
        let processed = match self.mode {
            WorkflowMode::Squash => {
                let change = self.origin.resolve(source_ref)?;
                vec![self.process_change(&change, workdir)?]
            }
            WorkflowMode::Iterative => self.run_iterative(workdir, source_ref)?,
        };
        info!(
            "Workflow '{}' migrated {} change(s)",
            self.name,
            processed.len()
        );
        Ok(processed)
    }

    fn run_iterative(&self, workdir: &Path, source_ref: &str) -> Result<Vec<ChangeMetadata>> {
        let previous = self.resume_point()?;
        debug!("Resuming after {}", previous);

        let mut processed = Vec::new();
        for change in self.origin.changes_between(Some(previous.as_str()), source_ref)? {
            processed.push(self.process_change(&change?, workdir)?);
        }
        if processed.is_empty() {
            info!("No changes after {} up to {}", previous, source_ref);
        }
        Ok(processed)
    }

    fn resume_point(&self) -> Result<String> {
        if let Some(previous) = &self.previous_ref {
            return Ok(previous.clone());
        }
        let label = self.origin.label_name();
        self.destination
            .previous_ref(label)?
            .ok_or_else(|| Error::repo(format!("Previous revision label {} could not be found", label)))
    }

    fn process_change(&self, change: &Change, workdir: &Path) -> Result<ChangeMetadata> {
        info!("Migrating {}", change.reference);
        reset_workdir(workdir)?;
        self.origin.materialize(change, workdir)?;

        if !self.exclusions.is_empty() {
            let deleted = self.exclusions.apply(workdir)?;
            debug!("Excluded {} file(s) from {}", deleted, change.reference);
        }
        for transformation in &self.transformations {
            debug!("Applying {:?}", transformation);
            transformation.apply(workdir)?;
        }

        let metadata = ChangeMetadata {
            label: self.origin.label_name().to_string(),
            origin_ref: change.reference.clone(),
            summary: change.summary.clone(),
            timestamp: change.timestamp.unwrap_or_else(|| {
                debug!("{} has no timestamp, using the current time", change.reference);
                now_seconds()
            }),
        };
        self.destination.process(&metadata, workdir)?;
        Ok(metadata)
    }
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Workflow{{name: {}, mode: {}, origin: {:?}, destination: {:?}, \
             transformations: {}, excluded_origin_paths: {}}}",
            self.name,
            self.mode,
            self.origin,
            self.destination,
            self.transformations.len(),
            self.exclusions
        )
    }
}

/// Empty `workdir`, creating it if needed.
fn reset_workdir(workdir: &Path) -> Result<()> {
    if workdir.exists() {
        for entry in fs::read_dir(workdir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(entry.path())?;
            } else {
                fs::remove_file(entry.path())?;
            }
        }
    } else {
        fs::create_dir_all(workdir)?;
    }
    Ok(())
}

fn now_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
