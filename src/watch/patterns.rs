// src/watch/patterns.rs

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

/// Compiled include/exclude globs.
///
/// Patterns are matched against paths relative to a watched root, with
/// forward slashes (e.g. `"src/main.rs"`).
#[derive(Clone)]
pub struct PathFilter {
    /// `None` accepts every path.
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl fmt::Debug for PathFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathFilter")
            .field("include", &self.include.as_ref().map(GlobSet::len))
            .field("exclude", &self.exclude.as_ref().map_or(0, GlobSet::len))
            .finish()
    }
}

impl PathFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        let include = Some(build_globset(include).context("building include globset")?);
        let exclude = if exclude.is_empty() {
            None
        } else {
            Some(build_globset(exclude).context("building exclude globset")?)
        };
        Ok(Self { include, exclude })
    }

    /// Accept everything.
    pub fn allow_all() -> Self {
        Self {
            include: None,
            exclude: None,
        }
    }

    /// Whether a root-relative path passes the filter.
    pub fn matches(&self, rel_path: &str) -> bool {
        if self
            .include
            .as_ref()
            .is_some_and(|include| !include.is_match(rel_path))
        {
            return false;
        }
        !self
            .exclude
            .as_ref()
            .is_some_and(|exclude| exclude.is_match(rel_path))
    }

    /// Match an absolute event path against whichever root contains it.
    /// Paths outside every root are rejected.
    pub fn matches_under(&self, roots: &[PathBuf], path: &Path) -> bool {
        roots
            .iter()
            .find_map(|root| relative_str(root, path))
            .is_some_and(|rel| self.matches(&rel))
    }
}

/// `path` relative to `root` with forward slashes, if it lies below it.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    path.strip_prefix(root)
        .ok()
        .map(|rel| rel.to_string_lossy().replace('\\', "/"))
}

/// Build a `GlobSet` from a list of glob patterns.
fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    let set = builder.build()?;
    Ok(set)
}
