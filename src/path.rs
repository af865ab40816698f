//! Path manipulation utilities for repo-migrate
//!
//! - [`PathMatcher`] compiles a glob-like exclusion pattern (`*`, `?`, `[..]`
//!   and the recursive `**` component) into a predicate over paths relative
//!   to a working directory.
//! - [`resolve_within`] resolves a pattern against a working directory and
//!   rejects it if it points outside.
//! - [`escape_url`] turns a repository URL into a single filesystem-safe
//!   directory name.

use crate::error::{Error, Result};
use glob::{MatchOptions, Pattern};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// `*` and `?` never cross a `/`; only `**` recurses.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A compiled exclusion pattern, relative to a working directory root.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    /// Normalized relative pattern, `/`-separated
    pattern: String,
    compiled: Pattern,
}

impl PathMatcher {
    /// Compile a relative pattern. Use [`resolve_within`] first when the
    /// pattern comes from user configuration.
    pub fn new(pattern: &str) -> Result<Self> {
        let compiled = Pattern::new(pattern).map_err(|e| {
            Error::config(format!("Invalid exclusion pattern '{}': {}", pattern, e))
        })?;
        Ok(Self {
            pattern: pattern.to_string(),
            compiled,
        })
    }

    /// Whether `relative` (a path relative to the workdir root) matches.
    pub fn matches(&self, relative: &Path) -> bool {
        self.compiled.matches_path_with(relative, MATCH_OPTIONS)
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }
}

impl fmt::Display for PathMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

/// Lexically normalize a path: drop `.` components and fold `..` into its
/// parent. Never touches the filesystem, so symlinks are not followed.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                // `..` at the root stays at the root
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other),
        }
    }
    out
}

/// Resolve `pattern` against `workdir` and return it relative to the workdir.
///
/// Fails with [`Error::ConfigValidation`] when the resolved path is not
/// inside `workdir` (for example `../../../file` or an absolute path
/// elsewhere).
pub fn resolve_within(workdir: &Path, pattern: &str) -> Result<PathBuf> {
    let root = normalize(workdir);
    let resolved = normalize(&root.join(pattern));
    match resolved.strip_prefix(&root) {
        Ok(relative) => Ok(relative.to_path_buf()),
        Err(_) => Err(Error::config(format!(
            "Path '{}' ({}) is not relative to '{}'",
            pattern,
            resolved.display(),
            root.display()
        ))),
    }
}

/// Percent-escape a repository URL into a directory name.
///
/// ASCII letters, digits, `-` and `_` are kept, a space becomes `+`, and every
/// other byte of the UTF-8 encoding becomes `%XX` (upper-case hex).
pub fn escape_url(url: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(url.len() * 3);
    for byte in url.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' => out.push(char::from(byte)),
            b' ' => out.push('+'),
            _ => {
                out.push('%');
                out.push(char::from(HEX[usize::from(byte >> 4)]));
                out.push(char::from(HEX[usize::from(byte & 0x0f)]));
            }
        }
    }
    out
}

/// Reverse [`escape_url`]. Returns `None` for names it could not have
/// produced.
pub fn unescape_url(name: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(name.len());
    let mut iter = name.bytes();
    while let Some(byte) = iter.next() {
        match byte {
            b'+' => bytes.push(b' '),
            b'%' => {
                let hi = char::from(iter.next()?).to_digit(16)?;
                let lo = char::from(iter.next()?).to_digit(16)?;
                bytes.push(u8::try_from(hi * 16 + lo).ok()?);
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' => bytes.push(byte),
            _ => return None,
        }
    }
    String::from_utf8(bytes).ok()
}
