// SPDX-License-Identifier: MIT OR Apache-2.0
//! Workspace layout and discovery.
//!
//! A workspace is a directory with a `.kash/` metadata dir holding the
//! selection history, param state, ignore file, and caches. A workspace is
//! initialized iff `.kash/` exists with the mandatory metadata files.

use kash_error::{KashError, Result};
use std::path::{Path, PathBuf};

/// Name of the metadata directory.
pub const DOT_DIR: &str = ".kash";

/// Name of the archive directory.
pub const ARCHIVE_DIR: &str = "archive";

/// The fixed file layout under a workspace root.
#[derive(Debug, Clone)]
pub struct MetadataDirs {
    base_dir: PathBuf,
}

impl MetadataDirs {
    /// Describe the layout for a workspace root.
    #[must_use]
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// The workspace root.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// `.kash/` metadata directory.
    #[must_use]
    pub fn dot_dir(&self) -> PathBuf {
        self.base_dir.join(DOT_DIR)
    }

    /// Persisted selection history.
    #[must_use]
    pub fn selections_yml(&self) -> PathBuf {
        self.dot_dir().join("selections.yml")
    }

    /// Persisted workspace-level parameter values.
    #[must_use]
    pub fn params_yml(&self) -> PathBuf {
        self.dot_dir().join("params.yml")
    }

    /// Additional ignore globs.
    #[must_use]
    pub fn ignore_file(&self) -> PathBuf {
        self.dot_dir().join("ignore")
    }

    /// Chat/command history.
    #[must_use]
    pub fn history_yml(&self) -> PathBuf {
        self.dot_dir().join("history.yml")
    }

    /// Cache root.
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.dot_dir().join("cache")
    }

    /// Downloaded media artifacts.
    #[must_use]
    pub fn media_cache_dir(&self) -> PathBuf {
        self.cache_dir().join("media")
    }

    /// Cached web/local files.
    #[must_use]
    pub fn content_cache_dir(&self) -> PathBuf {
        self.cache_dir().join("content")
    }

    /// Archived items.
    #[must_use]
    pub fn archive_dir(&self) -> PathBuf {
        self.base_dir.join(ARCHIVE_DIR)
    }

    /// Binary sidecar assets.
    #[must_use]
    pub fn assets_dir(&self) -> PathBuf {
        self.base_dir.join("assets")
    }

    /// Whether the workspace metadata exists.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.dot_dir().is_dir()
            && self.selections_yml().is_file()
            && self.params_yml().is_file()
    }

    /// Create the metadata directories and mandatory files.
    ///
    /// # Errors
    ///
    /// Returns an error if directories or files cannot be created.
    pub fn initialize(&self) -> Result<()> {
        for dir in [
            self.dot_dir(),
            self.cache_dir(),
            self.media_cache_dir(),
            self.content_cache_dir(),
            self.archive_dir(),
        ] {
            std::fs::create_dir_all(&dir)
                .map_err(|e| KashError::io(format!("create dir {}", dir.display()), e))?;
        }
        for file in [self.selections_yml(), self.params_yml()] {
            if !file.exists() {
                std::fs::write(&file, "")
                    .map_err(|e| KashError::io(format!("create {}", file.display()), e))?;
            }
        }
        Ok(())
    }
}

/// Whether a directory is an initialized workspace.
#[must_use]
pub fn is_ws_dir(path: &Path) -> bool {
    MetadataDirs::new(path.to_path_buf()).is_initialized()
}

/// The workspace directory enclosing the given path: itself, a parent, or
/// `None`.
#[must_use]
pub fn enclosing_ws_dir(path: &Path) -> Option<PathBuf> {
    let mut dir = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(path)
    };
    loop {
        if is_ws_dir(&dir) {
            return Some(dir);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Validate a strict workspace name: alphanumeric plus `_`, `-`, and `.`.
///
/// # Errors
///
/// Returns [`KashError::InvalidInput`] for empty or malformed names.
pub fn check_workspace_name(name: &str) -> Result<String> {
    let name = name.trim().trim_end_matches('/');
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return Err(KashError::InvalidInput(format!(
            "use an alphanumeric workspace name (`-` and `.` also allowed): {name:?}"
        )));
    }
    Ok(name.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
