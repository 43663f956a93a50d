// SPDX-License-Identifier: MIT OR Apache-2.0
//! Store-relative paths with `@`-mention syntax.
//!
//! A [`StorePath`] is a relative path within a store (a workspace directory)
//! plus an optional store name. Standard forms:
//!
//! - `folder1/folder2/filename.ext`: a path within the current store
//! - `~store_name/folder/filename.ext`: a path within a named store
//! - `@folder/filename.ext` and `@/folder/filename.ext`: `@`-mention forms
//! - `@'folder 1/file.ext'`: single-quoted when the path contains spaces
//!
//! Bare absolute paths, URLs, empty paths, and `.` are rejected.

use crate::urls::is_url;
use kash_error::{KashError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Prefix that marks an `@`-mentioned store path.
pub const AT_PREFIX: char = '@';

fn is_valid_store_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
}

/// Quote a path string for display, using single quotes when it contains
/// whitespace (shell-style).
fn shell_quote(s: &str) -> String {
    if s.chars().any(char::is_whitespace) {
        format!("'{s}'")
    } else {
        s.to_string()
    }
}

/// A relative path within a store, with an optional store name.
///
/// Equality considers both the path and the store name. The `Display`
/// representation is the bare relative path; use
/// [`display_str`](StorePath::display_str) for the `@`-prefixed form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorePath {
    path: PathBuf,
    store_name: Option<String>,
}

impl StorePath {
    /// Parse a store path from any of the standard forms.
    ///
    /// # Errors
    ///
    /// Returns [`KashError::InvalidStorePath`] for absolute paths, URLs,
    /// empty paths, `.`, malformed `~store_name` prefixes, or unclosed
    /// quotes.
    pub fn parse(value: &str) -> Result<Self> {
        if is_url(value) {
            return Err(KashError::InvalidStorePath(format!(
                "expected a store path but got a URL: {value:?}"
            )));
        }

        let mut rest = value;

        // Ignore any @ prefix.
        if let Some(stripped) = rest.strip_prefix(AT_PREFIX) {
            rest = stripped;
        }

        // Handle single quotes.
        if let Some(stripped) = rest.strip_prefix('\'') {
            match stripped.strip_suffix('\'') {
                Some(quoted) if !quoted.contains('\'') => rest = quoted,
                _ => {
                    return Err(KashError::InvalidStorePath(format!(
                        "unclosed single quote in store path: {value:?}"
                    )))
                }
            }
        }

        // Handle a ~store_name/some/path prefix.
        let (store_name, path_str) = if let Some(named) = rest.strip_prefix('~') {
            match named.split_once('/') {
                Some((name, path_str))
                    if is_valid_store_name(name) && !path_str.trim().is_empty() =>
                {
                    if path_str.starts_with('/') {
                        return Err(KashError::InvalidStorePath(format!(
                            "invalid store path: {value:?}"
                        )));
                    }
                    (Some(name.to_string()), path_str)
                }
                _ => {
                    return Err(KashError::InvalidStorePath(format!(
                        "invalid store path: {value:?}"
                    )))
                }
            }
        } else {
            // A leading '/' after '@' refers to the store root.
            (None, rest.strip_prefix('/').unwrap_or(rest))
        };

        if value.starts_with('/') {
            return Err(KashError::InvalidStorePath(format!(
                "absolute store paths are not allowed: {value:?}"
            )));
        }

        let path = PathBuf::from(path_str);
        if path.as_os_str().is_empty() || path == Path::new(".") || path.is_absolute() {
            return Err(KashError::InvalidStorePath(format!(
                "invalid store path: {value:?}"
            )));
        }

        Ok(Self { path, store_name })
    }

    /// Build a store path from an already-relative [`Path`], bypassing the
    /// `@`-mention grammar. Rejects absolute and empty paths.
    pub fn from_rel_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if path.is_absolute() {
            return Err(KashError::InvalidStorePath(format!(
                "absolute store paths are not allowed: {path:?}"
            )));
        }
        if path.as_os_str().is_empty() || path == Path::new(".") {
            return Err(KashError::InvalidStorePath(format!(
                "invalid store path: {path:?}"
            )));
        }
        Ok(Self {
            path,
            store_name: None,
        })
    }

    /// The store name, if this path names one explicitly.
    #[must_use]
    pub fn store_name(&self) -> Option<&str> {
        self.store_name.as_deref()
    }

    /// Replace the store name.
    #[must_use]
    pub fn with_store_name(mut self, store_name: impl Into<String>) -> Self {
        self.store_name = Some(store_name.into());
        self
    }

    /// The bare relative path.
    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.path
    }

    /// Final path component, if any.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    /// Filename stem (final component without extensions), if any.
    #[must_use]
    pub fn file_stem(&self) -> Option<&str> {
        self.path.file_stem().and_then(|n| n.to_str())
    }

    /// Join with a relative path, yielding a new store path in the same store.
    ///
    /// # Errors
    ///
    /// Joining an absolute path, or a store path with a different store name,
    /// is an error.
    pub fn join(&self, other: impl AsRef<Path>) -> Result<Self> {
        let other = other.as_ref();
        if other.is_absolute() {
            return Err(KashError::InvalidStorePath(format!(
                "cannot join a store path with an absolute path: {other:?}"
            )));
        }
        Ok(Self {
            path: self.path.join(other),
            store_name: self.store_name.clone(),
        })
    }

    /// Join with another store path.
    ///
    /// # Errors
    ///
    /// Returns an error if the two paths name different stores.
    pub fn join_store_path(&self, other: &StorePath) -> Result<Self> {
        if self.store_name != other.store_name
            && self.store_name.is_some()
            && other.store_name.is_some()
        {
            return Err(KashError::InvalidStorePath(format!(
                "cannot join paths from different stores: {self} and {other}"
            )));
        }
        self.join(&other.path)
    }

    /// Whether this path is under the given relative prefix.
    #[must_use]
    pub fn starts_with(&self, prefix: impl AsRef<Path>) -> bool {
        self.path.starts_with(prefix)
    }

    /// `@`-prefixed display form, including the store name when present and
    /// quoting paths that contain spaces.
    #[must_use]
    pub fn display_str(&self) -> String {
        let path_str = self.path.to_string_lossy();
        let display = match &self.store_name {
            Some(name) => shell_quote(&format!("~{name}/{path_str}")),
            None => shell_quote(&path_str),
        };
        format!("{AT_PREFIX}{display}")
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

impl FromStr for StorePath {
    type Err = KashError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl AsRef<Path> for StorePath {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

// Serialized as the bare relative path, like any other path value.
impl Serialize for StorePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.path.to_string_lossy())
    }
}

impl<'de> Deserialize<'de> for StorePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        StorePath::parse(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_at_forms_identically() {
        let sp1 = StorePath::parse("some/relative/path").unwrap();
        let sp2 = StorePath::parse("@some/relative/path").unwrap();
        let sp3 = StorePath::parse("@/some/relative/path").unwrap();
        assert_eq!(sp1.store_name(), None);
        assert_eq!(sp1.to_string(), "some/relative/path");
        assert_eq!(sp1.display_str(), "@some/relative/path");
        assert_eq!(sp1, sp2);
        assert_eq!(sp1, sp3);
    }

    #[test]
    fn equality_considers_store_name() {
        let sp1 = StorePath::parse("@path/to/file").unwrap();
        let sp2 = StorePath::parse("path/to/file").unwrap();
        let sp3 = StorePath::parse("path/to/file").unwrap().with_store_name("store1");
        let sp4 = StorePath::parse("path/to/file").unwrap().with_store_name("store1");
        assert_eq!(sp1, sp2);
        assert_eq!(sp3, sp4);
        assert_ne!(sp1, sp3);

        let mut set = std::collections::HashSet::new();
        set.insert(sp1.clone());
        set.insert(sp3);
        assert_eq!(set.len(), 2);
        set.insert(sp2);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn parses_store_name_form() {
        let sp = StorePath::parse("@~mystore/folder/f.txt").unwrap();
        assert_eq!(sp.store_name(), Some("mystore"));
        assert_eq!(sp.to_string(), "folder/f.txt");
        assert_eq!(sp.display_str(), "@~mystore/folder/f.txt");
    }

    #[test]
    fn parses_quoted_paths_with_spaces() {
        let sp = StorePath::parse("@'folder 1/folder 2/filename.ext'").unwrap();
        assert_eq!(sp.store_name(), None);
        assert_eq!(sp.to_string(), "folder 1/folder 2/filename.ext");
        assert_eq!(sp.display_str(), "@'folder 1/folder 2/filename.ext'");

        let sp2 = StorePath::parse("@'/folder 1/folder 2/filename.ext'").unwrap();
        assert_eq!(sp, sp2);

        let sp3 = StorePath::parse("@'~store_name/file with spaces.txt'").unwrap();
        assert_eq!(sp3.store_name(), Some("store_name"));
        assert_eq!(sp3.to_string(), "file with spaces.txt");
        assert_eq!(sp3.display_str(), "@'~store_name/file with spaces.txt'");
    }

    #[test]
    fn rejects_invalid_inputs() {
        for bad in [
            "/absolute/path",
            ".",
            "",
            "https://example.com",
            "@~/folder/file.txt",
            "@~store-name/folder/file.txt",
            "~store_name/",
            "~store_name",
            "@~store_name",
            "@'folder/filename.ext",
            "@'folder/filename.ext' extra",
        ] {
            let err = StorePath::parse(bad).unwrap_err();
            assert!(
                matches!(err, KashError::InvalidStorePath(_)),
                "expected InvalidStorePath for {bad:?}, got {err:?}"
            );
        }
    }

    #[test]
    fn roundtrip_through_string() {
        for s in ["docs/some_file.doc.md", "a/b/c.txt"] {
            let sp = StorePath::parse(s).unwrap();
            assert_eq!(StorePath::parse(&sp.to_string()).unwrap(), sp);
        }
    }

    #[test]
    fn join_preserves_store_and_rejects_absolute() {
        let base = StorePath::parse("base/store/path").unwrap();
        let joined = base.join("some/relative/path").unwrap();
        assert_eq!(joined.to_string(), "base/store/path/some/relative/path");
        assert_eq!(joined.store_name(), None);

        let err = base.join("/absolute/path").unwrap_err();
        assert!(matches!(err, KashError::InvalidStorePath(_)));

        let named = StorePath::parse("a/b").unwrap().with_store_name("s1");
        let other = StorePath::parse("c/d").unwrap().with_store_name("s2");
        assert!(named.join_store_path(&other).is_err());

        let unnamed = StorePath::parse("c/d").unwrap();
        let ok = named.join_store_path(&unnamed).unwrap();
        assert_eq!(ok.store_name(), Some("s1"));
        assert_eq!(ok.to_string(), "a/b/c/d");
    }

    #[test]
    fn serde_uses_bare_path() {
        let sp = StorePath::parse("docs/x.doc.md").unwrap();
        let json = serde_json::to_string(&sp).unwrap();
        assert_eq!(json, r#""docs/x.doc.md""#);
        let back: StorePath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sp);
    }
}
