//! Transformations applied to a materialized working tree
//!
//! A [`Transformation`] rewrites files under the workdir in place. The
//! workflow runs them strictly in declared order, after exclusion
//! filtering, and any failure aborts the run unchanged.
//!
//! [`Replace`] is the built-in regex replacement. Its `before` and `after`
//! templates are literal text with `${name}` placeholders, each bound to a
//! regular expression through `regex_groups`:
//!
//! ```
//! use repo_migrate::transform::Replace;
//! use std::collections::BTreeMap;
//!
//! let groups = BTreeMap::from([("line".to_string(), ".+".to_string())]);
//! let replace = Replace::new("${line}", "PUBLIC ${line}", &groups).unwrap();
//! assert_eq!(replace.replace_str("one\ntwo"), ("PUBLIC one\nPUBLIC two".to_string(), 2));
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::Path;

use log::{debug, warn};
use regex::Regex;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::path::PathMatcher;

/// A mutation of the working tree.
pub trait Transformation: fmt::Debug {
    fn apply(&self, workdir: &Path) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Group(String),
}

/// Split a template into literal text and `${name}` placeholders.
fn parse_template(template: &str) -> Vec<Piece> {
    let mut pieces = Vec::new();
    let mut literal = String::new();
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let name_len = after
            .find('}')
            .filter(|&end| end > 0 && after[..end].chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        match name_len {
            Some(end) => {
                literal.push_str(&rest[..start]);
                if !literal.is_empty() {
                    pieces.push(Piece::Literal(std::mem::take(&mut literal)));
                }
                pieces.push(Piece::Group(after[..end].to_string()));
                rest = &after[end + 1..];
            }
            None => {
                literal.push_str(&rest[..start + 2]);
                rest = after;
            }
        }
    }
    literal.push_str(rest);
    if !literal.is_empty() {
        pieces.push(Piece::Literal(literal));
    }
    pieces
}

/// Regex replacement driven by `before`/`after` templates.
#[derive(Debug, Clone)]
pub struct Replace {
    before: String,
    after: String,
    regex: Regex,
    replacement: String,
    paths: Option<PathMatcher>,
    required: bool,
}

impl Replace {
    /// Compile the templates. Every placeholder in `before` must be defined
    /// in `regex_groups` and appear once; every placeholder in `after` must
    /// appear in `before`; every defined group must be used.
    pub fn new(before: &str, after: &str, regex_groups: &BTreeMap<String, String>) -> Result<Self> {
        if before.is_empty() {
            return Err(Error::config("Replace: 'before' must not be empty"));
        }

        let mut pattern = String::from("(?m)");
        let mut used = BTreeSet::new();
        for piece in parse_template(before) {
            match piece {
                Piece::Literal(text) => pattern.push_str(&regex::escape(&text)),
                Piece::Group(name) => {
                    let group = regex_groups.get(&name).ok_or_else(|| {
                        Error::config(format!(
                            "Replace: '${{{}}}' is used in 'before' but not defined in regex_groups",
                            name
                        ))
                    })?;
                    if !used.insert(name.clone()) {
                        return Err(Error::config(format!(
                            "Replace: '${{{}}}' is used more than once in 'before'",
                            name
                        )));
                    }
                    pattern.push_str(&format!("(?P<{}>{})", name, group));
                }
            }
        }
        if let Some(unused) = regex_groups.keys().find(|k| !used.contains(*k)) {
            return Err(Error::config(format!(
                "Replace: regex group '{}' is defined but not used in 'before'",
                unused
            )));
        }

        let mut replacement = String::new();
        for piece in parse_template(after) {
            match piece {
                Piece::Literal(text) => replacement.push_str(&text.replace('$', "$$")),
                Piece::Group(name) => {
                    if !used.contains(&name) {
                        return Err(Error::config(format!(
                            "Replace: '${{{}}}' is used in 'after' but not in 'before'",
                            name
                        )));
                    }
                    replacement.push_str(&format!("${{{}}}", name));
                }
            }
        }

        Ok(Self {
            before: before.to_string(),
            after: after.to_string(),
            regex: Regex::new(&pattern)?,
            replacement,
            paths: None,
            required: true,
        })
    }

    /// Only touch files whose workdir-relative path matches `glob`.
    pub fn with_paths(mut self, glob: &str) -> Result<Self> {
        self.paths = Some(PathMatcher::new(glob)?);
        Ok(self)
    }

    /// Whether finding no match anywhere is an error (default `true`).
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Replace every match in `text`, returning the new text and the number
    /// of matches.
    pub fn replace_str(&self, text: &str) -> (String, usize) {
        let count = self.regex.find_iter(text).count();
        if count == 0 {
            return (text.to_string(), 0);
        }
        let replaced = self
            .regex
            .replace_all(text, self.replacement.as_str())
            .into_owned();
        (replaced, count)
    }
}

impl Transformation for Replace {
    fn apply(&self, workdir: &Path) -> Result<()> {
        let mut total = 0;
        let walker = WalkDir::new(workdir)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| !(e.depth() == 1 && e.file_name() == ".git"));
        for entry in walker {
            let entry = entry.map_err(|e| {
                Error::repo(format!("Cannot walk workdir '{}': {}", workdir.display(), e))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(workdir) else {
                continue;
            };
            if let Some(paths) = &self.paths {
                if !paths.matches(relative) {
                    continue;
                }
            }
            let bytes = fs::read(entry.path())?;
            let Ok(content) = String::from_utf8(bytes) else {
                warn!("Skipping non UTF-8 file {}", relative.display());
                continue;
            };
            let (replaced, count) = self.replace_str(&content);
            if count > 0 {
                debug!("{}: {} replacement(s)", relative.display(), count);
                fs::write(entry.path(), replaced)?;
                total += count;
            }
        }

        if total == 0 && self.required {
            return Err(Error::repo(format!(
                "Transformation '{}' failed: required match not found for '{}'",
                self, self.before
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Replace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "replace {} -> {}", self.before, self.after)?;
        if let Some(paths) = &self.paths {
            write!(f, " in {}", paths)?;
        }
        Ok(())
    }
}
