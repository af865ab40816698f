//! # Validate Command Implementation
//!
//! Parses the config file and builds the workflow from it, which compiles
//! every exclusion glob and transformation template. Nothing is fetched and
//! no file outside the config is read.
//!
//! Exclusion patterns are also checked against a placeholder workdir so
//! that patterns escaping the workdir are reported before a real run.

use anyhow::Result;
use clap::Args;
use std::path::{Path, PathBuf};

use repo_migrate::config::{self, BuildOptions};
use repo_migrate::defaults;
use repo_migrate::output::{emoji, OutputConfig};

/// Validate a repo-migrate configuration file
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the configuration file to validate.
    #[arg(short, long, value_name = "FILE", env = "REPO_MIGRATE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Execute the `validate` command.
pub fn execute(args: ValidateArgs, color_flag: &str) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    let config_path = args
        .config
        .unwrap_or_else(|| PathBuf::from(defaults::DEFAULT_CONFIG_FILE));
    println!(
        "{} Validating configuration: {}",
        emoji(&out, "🔍", "[SCAN]"),
        config_path.display()
    );

    let config = match config::from_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("{} {}", emoji(&out, "❌", "[ERR]"), e);
            return Err(anyhow::anyhow!("Configuration parsing failed: {}", e));
        }
    };

    let workflow = match config.build(&BuildOptions::default()) {
        Ok(workflow) => workflow,
        Err(e) => {
            println!("{} {}", emoji(&out, "❌", "[ERR]"), e);
            return Err(anyhow::anyhow!("Configuration is invalid: {}", e));
        }
    };
    if let Err(e) = workflow.exclusions().resolve(Path::new("/workdir")) {
        println!("{} {}", emoji(&out, "❌", "[ERR]"), e);
        return Err(anyhow::anyhow!("Configuration is invalid: {}", e));
    }

    println!("{} Configuration is valid", emoji(&out, "✅", "[OK]"));
    println!("   Name: {}", config.name);
    println!("   Mode: {}", config.mode);
    println!("   Source ref: {}", config.default_source_ref());
    println!("   Excluded patterns: {}", workflow.exclusions());
    println!("   Transformations: {}", config.transformations.len());
    Ok(())
}
