//! # repo-migrate CLI
//!
//! Binary entry point. Parses arguments with `clap`, sets up logging and
//! dispatches to the subcommands in `commands`. All migration logic lives in
//! the library crate.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}
