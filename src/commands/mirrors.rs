//! # Mirrors Command Implementation
//!
//! Manages the local mirror storage.
//!
//! - **`list`**: every mirror directory with the URL it belongs to
//! - **`clean`**: delete one mirror (`--url`) or all of them (`--all`)

use anyhow::Result;
use clap::{Args, Subcommand};
use dialoguer::{theme::ColorfulTheme, Confirm};
use std::path::PathBuf;

use repo_migrate::defaults;
use repo_migrate::mirror::{MirrorEntry, MirrorStore};
use repo_migrate::output::{emoji, OutputConfig};

/// Manage repository mirrors
#[derive(Args, Debug)]
pub struct MirrorsArgs {
    /// Root directory of repository mirrors.
    ///
    /// Defaults to the system cache directory (e.g.
    /// `~/.cache/repo-migrate/mirrors` on Linux).
    #[arg(long, value_name = "DIR", env = "REPO_MIGRATE_MIRRORS")]
    pub mirror_root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: MirrorsSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum MirrorsSubcommand {
    /// List all mirrors
    List(ListArgs),
    /// Delete mirrors
    Clean(CleanArgs),
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct CleanArgs {
    /// Delete every mirror
    #[arg(long, conflicts_with = "url")]
    pub all: bool,

    /// Delete the mirror of this repository URL
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,

    /// Show what would be deleted without deleting anything
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(long)]
    pub yes: bool,
}

/// Execute the `mirrors` command.
pub fn execute(args: MirrorsArgs, color_flag: &str) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    let store = MirrorStore::new(
        args.mirror_root
            .unwrap_or_else(defaults::default_mirror_root),
    );
    match args.command {
        MirrorsSubcommand::List(list_args) => execute_list(&store, list_args),
        MirrorsSubcommand::Clean(clean_args) => execute_clean(&store, clean_args, &out),
    }
}

fn execute_list(store: &MirrorStore, args: ListArgs) -> Result<()> {
    let entries = store.list()?;
    if args.json {
        let json: Vec<serde_json::Value> = entries
            .iter()
            .map(|e| {
                serde_json::json!({
                    "name": e.name,
                    "url": e.url,
                    "path": e.path.display().to_string(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No mirrors found in: {}", store.root().display());
        return Ok(());
    }
    println!("Mirrors in {}:\n", store.root().display());
    for entry in &entries {
        println!("  {}", entry.url.as_deref().unwrap_or(&entry.name));
    }
    println!("\nTotal: {} mirror(s)", entries.len());
    Ok(())
}

fn execute_clean(store: &MirrorStore, args: CleanArgs, out: &OutputConfig) -> Result<()> {
    let targets: Vec<MirrorEntry> = if args.all {
        store.list()?
    } else if let Some(url) = &args.url {
        store
            .list()?
            .into_iter()
            .filter(|e| e.url.as_deref() == Some(url.as_str()))
            .collect()
    } else {
        anyhow::bail!("Specify --all or --url URL to choose which mirrors to delete");
    };

    if targets.is_empty() {
        println!("No mirrors to clean.");
        return Ok(());
    }

    println!("Mirrors to be deleted:\n");
    for entry in &targets {
        println!("  {}", entry.path.display());
    }
    if args.dry_run {
        println!("\n{} Dry run mode - no changes were made.", emoji(out, "🔎", "[DRY]"));
        return Ok(());
    }

    if !args.yes {
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Delete {} mirror(s)?", targets.len()))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Clean cancelled.");
            return Ok(());
        }
    }

    let mut deleted = 0;
    for entry in &targets {
        let removed = match &entry.url {
            Some(url) => store.remove(url)?,
            None => {
                std::fs::remove_dir_all(&entry.path)?;
                true
            }
        };
        if removed {
            deleted += 1;
            println!("  {} Deleted: {}", emoji(out, "✅", "[OK]"), entry.path.display());
        }
    }
    println!("\nDeleted {} mirror(s).", deleted);
    Ok(())
}
