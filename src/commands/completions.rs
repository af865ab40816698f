//! # Completions Command Implementation
//!
//! Prints a shell completion script for `repo-migrate` to stdout.
//!
//! ```bash
//! repo-migrate completions bash > ~/.local/share/bash-completion/completions/repo-migrate
//! repo-migrate completions zsh > ~/.zfunc/_repo-migrate
//! ```

use anyhow::Result;
use clap::{Args, CommandFactory};
use clap_complete::{generate, Shell};
use std::io;

use crate::cli::Cli;

/// Generate shell completion scripts
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for (bash, zsh, fish, powershell, elvish)
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Execute the `completions` command.
pub fn execute(args: CompletionsArgs) -> Result<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(args.shell, &mut cmd, name, &mut io::stdout());
    Ok(())
}
