// SPDX-License-Identifier: MIT OR Apache-2.0
//! Ignore filters for store walks.
//!
//! The default filter skips the `.kash/` metadata directory, the archive,
//! and hidden files. A per-workspace ignore file (`.kash/ignore`) adds
//! glob patterns on top.

use globset::{Glob, GlobSet, GlobSetBuilder};
use kash_error::{KashError, Result};
use std::path::Path;
use tracing::warn;

/// Compiled ignore rules for one workspace.
#[derive(Debug, Clone)]
pub struct IgnoreChecker {
    globs: Option<GlobSet>,
}

impl Default for IgnoreChecker {
    fn default() -> Self {
        Self { globs: None }
    }
}

impl IgnoreChecker {
    /// The default rules only (no workspace patterns).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile patterns from the workspace ignore file; a missing file
    /// yields the default rules. Blank lines and `#` comments are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error for unreadable files or invalid glob patterns.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| KashError::io(format!("read {}", path.display()), e))?;
        Self::from_patterns(content.lines())
    }

    /// Compile explicit patterns on top of the default rules.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid glob patterns.
    pub fn from_patterns<'a>(patterns: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        let mut any = false;
        for line in patterns {
            let pattern = line.trim();
            if pattern.is_empty() || pattern.starts_with('#') {
                continue;
            }
            // Directory patterns like `drafts/` match everything below.
            let glob_str = match pattern.strip_suffix('/') {
                Some(dir) => format!("{dir}/**"),
                None => pattern.to_string(),
            };
            builder.add(
                Glob::new(&glob_str)
                    .map_err(|e| KashError::InvalidInput(format!("invalid ignore glob: {e}")))?,
            );
            any = true;
        }
        let globs = if any {
            Some(builder.build().map_err(|e| {
                KashError::InvalidInput(format!("could not compile ignore globs: {e}"))
            })?)
        } else {
            None
        };
        Ok(Self { globs })
    }

    /// Whether a workspace-relative path should be skipped.
    #[must_use]
    pub fn is_ignored(&self, rel_path: &Path) -> bool {
        // Built-in rules: metadata dir, archive, hidden files anywhere.
        for component in rel_path.components() {
            let name = component.as_os_str().to_string_lossy();
            if name.starts_with('.') {
                return true;
            }
        }
        if rel_path.starts_with("archive") {
            return true;
        }
        self.globs.as_ref().is_some_and(|g| g.is_match(rel_path))
    }
}

/// Append lines to an ignore-style file if not already present (used to
/// keep `.kash/` out of version control).
pub fn add_to_ignore_file(path: &Path, lines: &[&str]) {
    let existing = std::fs::read_to_string(path).unwrap_or_default();
    let mut to_add: Vec<&str> = lines
        .iter()
        .copied()
        .filter(|l| !existing.lines().any(|e| e.trim() == *l))
        .collect();
    if to_add.is_empty() {
        return;
    }
    let mut content = existing;
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content.push_str(&to_add.drain(..).collect::<Vec<_>>().join("\n"));
    content.push('\n');
    if let Err(e) = std::fs::write(path, content) {
        warn!(target: "kash.store", path = %path.display(), error = %e, "could not update ignore file");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
