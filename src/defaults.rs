//! Default values for repo-migrate configuration.
//!
//! Centralized so that the CLI, config building and tests agree.

use std::path::PathBuf;

/// Config file looked up in the current directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "repo-migrate.yaml";

/// Git executable used when none is configured.
pub const DEFAULT_GIT: &str = "git";

/// Returns the default mirror storage root.
///
/// Uses the platform-appropriate cache directory:
/// - Linux: `~/.cache/repo-migrate/mirrors` (XDG Base Directory)
/// - macOS: `~/Library/Caches/repo-migrate/mirrors`
/// - Windows: `{FOLDERID_LocalAppData}\repo-migrate\mirrors`
///
/// Falls back to `.repo-migrate-cache/mirrors` in the current directory if
/// the platform cache directory cannot be determined.
///
/// This can be overridden by the `--mirror-root` CLI flag or the
/// `REPO_MIGRATE_MIRRORS` environment variable.
pub fn default_mirror_root() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("repo-migrate"))
        .unwrap_or_else(|| PathBuf::from(".repo-migrate-cache"))
        .join("mirrors")
}
