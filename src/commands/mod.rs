//! # CLI Command Implementations
//!
//! One module per subcommand of `repo-migrate`. Each holds a `clap`-derived
//! `Args` struct and an `execute` function that calls into the
//! `repo_migrate` library.

pub mod completions;
pub mod migrate;
pub mod mirrors;
pub mod validate;
