//! # repo-migrate
//!
//! Moves changes from an origin repository into a destination, deleting
//! excluded paths and applying an ordered chain of transformations to each
//! change on the way. Typical use is keeping a public mirror of an internal
//! codebase in sync without cherry-picking by hand.
//!
//! ## Quick Example
//!
//! ```
//! use repo_migrate::config;
//! use repo_migrate::workflow::WorkflowMode;
//!
//! let yaml = r#"
//! mode: iterative
//! origin:
//!   git:
//!     url: https://example.com/internal.git
//! destination:
//!   folder:
//!     path: ./public
//! exclude: ["internal/**"]
//! "#;
//! let config = config::parse(yaml).unwrap();
//! assert_eq!(config.mode, WorkflowMode::Iterative);
//! assert_eq!(config.default_source_ref(), "origin/main");
//! ```
//!
//! ## Core Concepts
//!
//! - **Workflow (`workflow`)**: decides which changes to migrate (one squashed
//!   commit, or one per origin change resumed from the destination's last
//!   recorded reference) and drives each through the pipeline.
//! - **Origin / Destination (`origin`, `destination`)**: where changes come
//!   from and where they land. `GitOrigin` and `FolderDestination` are built
//!   in; anything implementing the traits can be plugged in.
//! - **Exclusion (`exclude`, `path`)**: glob patterns deleting files from the
//!   tree before transformations see it.
//! - **Transformations (`transform`)**: in-place rewrites of the tree, such
//!   as `Replace`.
//! - **Repository access (`git`, `mirror`, `command`)**: one persistent bare
//!   mirror per origin URL, fetched and checked out through the `git`
//!   executable, with failures classified into friendly messages.
//!
//! ## Execution Flow
//!
//! For every change selected by the workflow mode:
//!
//! 1.  **Materialize**: the workdir is emptied and the change's tree is
//!     checked out into it.
//! 2.  **Exclude**: matching files are deleted; a pass deleting nothing
//!     fails the run.
//! 3.  **Transform**: each transformation runs in declared order.
//! 4.  **Commit**: the destination receives the tree with the change's
//!     reference, summary and timestamp.

pub mod command;
pub mod config;
pub mod defaults;
pub mod destination;
pub mod error;
pub mod exclude;
pub mod git;
pub mod mirror;
pub mod origin;
pub mod output;
pub mod path;
pub mod transform;
pub mod workflow;

#[cfg(test)]
mod path_proptest;
