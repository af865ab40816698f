//! # Migrate Command Implementation
//!
//! Loads the config file, builds the workflow and runs it up to the given
//! source reference (or the origin's configured ref). Without `--workdir`
//! the run uses a temporary directory that is removed afterwards.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use repo_migrate::config::{self, BuildOptions};
use repo_migrate::defaults;
use repo_migrate::output::{emoji, spinner, OutputConfig};

/// Run a migration
#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Origin reference to migrate up to (defaults to the configured origin ref)
    #[arg(value_name = "SOURCE_REF")]
    pub source_ref: Option<String>,

    /// Path to the config file
    #[arg(short, long, value_name = "PATH", env = "REPO_MIGRATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Scratch directory for materialized trees (emptied before each change)
    #[arg(short, long, value_name = "DIR")]
    pub workdir: Option<PathBuf>,

    /// Resume iterative mode after this origin reference
    #[arg(long, value_name = "REF")]
    pub last_rev: Option<String>,

    /// Root directory of repository mirrors
    #[arg(long, value_name = "DIR", env = "REPO_MIGRATE_MIRRORS")]
    pub mirror_root: Option<PathBuf>,

    /// Git executable
    #[arg(long, value_name = "PATH", env = "REPO_MIGRATE_GIT")]
    pub git: Option<String>,

    /// Kill git commands running longer than this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,
}

/// Execute the `migrate` command.
pub fn execute(args: MigrateArgs, color_flag: &str) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    let start_time = Instant::now();

    let config_path = args
        .config
        .unwrap_or_else(|| PathBuf::from(defaults::DEFAULT_CONFIG_FILE));
    if !config_path.exists() {
        anyhow::bail!("Configuration file not found: {}", config_path.display());
    }
    let config = config::from_file(&config_path)?;

    let options = BuildOptions {
        mirror_root: args
            .mirror_root
            .unwrap_or_else(defaults::default_mirror_root),
        git_executable: args
            .git
            .unwrap_or_else(|| defaults::DEFAULT_GIT.to_string()),
        previous_ref: args.last_rev,
        timeout: args.timeout.map(Duration::from_secs),
    };
    let workflow = config.build(&options)?;
    log::debug!("{}", workflow);

    let source_ref = args
        .source_ref
        .unwrap_or_else(|| config.default_source_ref().to_string());

    // Keeps a temporary workdir alive until the run ends
    let (_temp, workdir) = match args.workdir {
        Some(dir) => (None, dir),
        None => {
            let temp = tempfile::Builder::new()
                .prefix("repo-migrate-")
                .tempdir()
                .context("Failed to create temporary workdir")?;
            let path = temp.path().to_path_buf();
            (Some(temp), path)
        }
    };

    if !args.quiet {
        println!(
            "{} Migrating '{}' ({} mode) up to {}",
            emoji(&out, "🚚", "[RUN]"),
            workflow.name(),
            workflow.mode(),
            source_ref
        );
    }

    let bar = if args.quiet {
        indicatif::ProgressBar::hidden()
    } else {
        spinner(&out, format!("Running workflow '{}'", workflow.name()))
    };
    let result = workflow.run(&workdir, &source_ref);
    bar.finish_and_clear();
    let processed = result?;

    if !args.quiet {
        for change in &processed {
            let summary = change.summary.lines().next().unwrap_or_default();
            println!("   {} {}", change.origin_ref, summary);
        }
        println!(
            "{} Migrated {} change(s) in {:.2}s",
            emoji(&out, "✅", "[OK]"),
            processed.len(),
            start_time.elapsed().as_secs_f64()
        );
    }
    Ok(())
}
