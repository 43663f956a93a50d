// SPDX-License-Identifier: MIT OR Apache-2.0
//! Selections and the persisted selection history.
//!
//! A [`Selection`] is a list of store paths. The [`SelectionHistory`] is a
//! bounded deque of selections persisted to `selections.yml`; the current
//! selection acts as the implicit argument stack for the next action.

use kash_core::paths::StorePath;
use kash_error::{KashError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Default bound on the selection history.
pub const DEFAULT_MAX_HISTORY: usize = 50;

/// An ordered list of store paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    /// The selected paths.
    pub paths: Vec<StorePath>,
}

impl Selection {
    /// Create a selection from paths.
    #[must_use]
    pub fn new(paths: Vec<StorePath>) -> Self {
        Self { paths }
    }

    /// True when nothing is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryFile {
    #[serde(default)]
    history: Vec<Selection>,
    #[serde(default)]
    position: Option<usize>,
}

/// A bounded, persisted history of selections with a navigation position.
///
/// The current selection is the entry at the position (normally the last).
/// Pushes are idempotent against the immediately previous entry, discard
/// empty selections, and truncate any forward (redo) entries.
#[derive(Debug)]
pub struct SelectionHistory {
    path: PathBuf,
    history: Vec<Selection>,
    /// Index of the current entry; `None` when the history is empty.
    position: Option<usize>,
    max_history: usize,
}

impl SelectionHistory {
    /// Load the history from a YAML file. A missing file is an empty
    /// history; unparseable YAML is logged and discarded.
    #[must_use]
    pub fn init(path: PathBuf, max_history: usize) -> Self {
        let loaded: HistoryFile = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => HistoryFile::default(),
            Ok(content) => match serde_yaml::from_str(&content) {
                Ok(file) => file,
                Err(e) => {
                    warn!(
                        target: "kash.store",
                        path = %path.display(),
                        error = %e,
                        "unparseable selection history, starting empty"
                    );
                    HistoryFile::default()
                }
            },
            Err(_) => HistoryFile::default(),
        };

        let mut history = Self {
            path,
            history: loaded.history,
            position: None,
            max_history,
        };
        history.position = match loaded.position {
            Some(p) if p < history.history.len() => Some(p),
            _ => history.history.len().checked_sub(1),
        };
        history.truncate();
        history
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// True when there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// The current selection, if any.
    #[must_use]
    pub fn current(&self) -> Option<&Selection> {
        self.position.and_then(|p| self.history.get(p))
    }

    /// Push a selection and persist. Empty selections are discarded;
    /// pushing a duplicate of the current entry only moves the position.
    pub fn push(&mut self, selection: Selection) {
        if selection.is_empty() {
            return;
        }
        // Drop any redo entries beyond the current position.
        if let Some(p) = self.position {
            self.history.truncate(p + 1);
        }
        if self.history.last() != Some(&selection) {
            self.history.push(selection);
        }
        self.position = self.history.len().checked_sub(1);
        self.truncate();
        self.save();
    }

    /// Move to the previous selection.
    ///
    /// # Errors
    ///
    /// Returns [`KashError::InvalidOperation`] at the start of the history.
    pub fn previous(&mut self) -> Result<&Selection> {
        match self.position {
            Some(p) if p > 0 => {
                self.position = Some(p - 1);
                self.save();
                Ok(&self.history[p - 1])
            }
            _ => Err(KashError::InvalidOperation(
                "already at the start of selection history".into(),
            )),
        }
    }

    /// Move to the next selection.
    ///
    /// # Errors
    ///
    /// Returns [`KashError::InvalidOperation`] at the end of the history.
    pub fn next(&mut self) -> Result<&Selection> {
        match self.position {
            Some(p) if p + 1 < self.history.len() => {
                self.position = Some(p + 1);
                self.save();
                Ok(&self.history[p + 1])
            }
            _ => Err(KashError::InvalidOperation(
                "already at the end of selection history".into(),
            )),
        }
    }

    /// Remove the given paths from every selection, dropping selections
    /// that become empty.
    pub fn remove_values(&mut self, paths: &[StorePath]) {
        if paths.is_empty() {
            return;
        }
        let current = self.current().cloned();
        for selection in &mut self.history {
            selection.paths.retain(|p| !paths.contains(p));
        }
        self.history.retain(|s| !s.is_empty());
        self.reposition(current.as_ref());
        self.save();
    }

    /// Replace paths across all selections (for renames).
    pub fn replace_values(&mut self, replacements: &[(StorePath, StorePath)]) {
        if replacements.is_empty() {
            return;
        }
        let current = self.current().cloned();
        for selection in &mut self.history {
            for path in &mut selection.paths {
                if let Some((_, new)) = replacements.iter().find(|(old, _)| old == path) {
                    *path = new.clone();
                }
            }
        }
        self.reposition(current.as_ref());
        self.save();
    }

    /// Drop paths for which `exists` is false, pruning empty selections.
    pub fn refresh(&mut self, exists: impl Fn(&StorePath) -> bool) {
        let current = self.current().cloned();
        for selection in &mut self.history {
            selection.paths.retain(|p| exists(p));
        }
        self.history.retain(|s| !s.is_empty());
        self.reposition(current.as_ref());
        self.save();
    }

    fn reposition(&mut self, previous_current: Option<&Selection>) {
        self.position = previous_current
            .and_then(|sel| self.history.iter().rposition(|s| s == sel))
            .or_else(|| self.history.len().checked_sub(1));
    }

    fn truncate(&mut self) {
        if self.history.len() > self.max_history {
            let drop = self.history.len() - self.max_history;
            self.history.drain(..drop);
            self.position = self
                .position
                .map(|p| p.saturating_sub(drop))
                .or_else(|| self.history.len().checked_sub(1));
        }
    }

    /// Persist to disk; failures are logged, not raised.
    fn save(&self) {
        let file = HistoryFile {
            history: self.history.clone(),
            position: self.position,
        };
        let content = match serde_yaml::to_string(&file) {
            Ok(c) => c,
            Err(e) => {
                warn!(target: "kash.store", error = %e, "could not serialize selection history");
                return;
            }
        };
        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(target: "kash.store", error = %e, "could not create selections dir");
                return;
            }
        }
        if let Err(e) = std::fs::write(&self.path, content) {
            warn!(
                target: "kash.store",
                path = %self.path.display(),
                error = %e,
                "could not persist selection history"
            );
        }
    }

    /// The backing file path.
    #[must_use]
    pub fn file_path(&self) -> &Path {
        &self.path
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sp(s: &str) -> StorePath {
        StorePath::parse(s).unwrap()
    }

    fn sel(paths: &[&str]) -> Selection {
        Selection::new(paths.iter().map(|p| sp(p)).collect())
    }

    fn temp_history(max: usize) -> (tempfile::TempDir, SelectionHistory) {
        let dir = tempfile::tempdir().unwrap();
        let history = SelectionHistory::init(dir.path().join("selections.yml"), max);
        (dir, history)
    }

    #[test]
    fn push_sets_current_and_skips_empty() {
        let (_dir, mut history) = temp_history(10);
        assert!(history.current().is_none());

        history.push(sel(&["docs/a.doc.md"]));
        assert_eq!(history.current(), Some(&sel(&["docs/a.doc.md"])));

        history.push(Selection::default());
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn push_is_idempotent_against_previous() {
        let (_dir, mut history) = temp_history(10);
        history.push(sel(&["docs/a.doc.md"]));
        history.push(sel(&["docs/a.doc.md"]));
        assert_eq!(history.len(), 1);

        history.push(sel(&["docs/b.doc.md"]));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn navigation_moves_and_errors_at_ends() {
        let (_dir, mut history) = temp_history(10);
        history.push(sel(&["docs/a.doc.md"]));
        history.push(sel(&["docs/b.doc.md"]));

        let prev = history.previous().unwrap().clone();
        assert_eq!(prev, sel(&["docs/a.doc.md"]));
        assert!(matches!(
            history.previous(),
            Err(KashError::InvalidOperation(_))
        ));

        let next = history.next().unwrap().clone();
        assert_eq!(next, sel(&["docs/b.doc.md"]));
        assert!(matches!(history.next(), Err(KashError::InvalidOperation(_))));
    }

    #[test]
    fn push_after_navigation_truncates_redo() {
        let (_dir, mut history) = temp_history(10);
        history.push(sel(&["docs/a.doc.md"]));
        history.push(sel(&["docs/b.doc.md"]));
        history.previous().unwrap();

        history.push(sel(&["docs/c.doc.md"]));
        assert_eq!(history.len(), 2);
        assert_eq!(history.current(), Some(&sel(&["docs/c.doc.md"])));
        assert!(history.next().is_err());
    }

    #[test]
    fn truncates_to_max_history() {
        let (_dir, mut history) = temp_history(3);
        for i in 0..6 {
            history.push(sel(&[&format!("docs/{i}.doc.md")]));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.current(), Some(&sel(&["docs/5.doc.md"])));
    }

    #[test]
    fn persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("selections.yml");
        {
            let mut history = SelectionHistory::init(path.clone(), 10);
            history.push(sel(&["docs/a.doc.md", "docs/b.doc.md"]));
        }
        let history = SelectionHistory::init(path, 10);
        assert_eq!(history.current(), Some(&sel(&["docs/a.doc.md", "docs/b.doc.md"])));
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("selections.yml");
        std::fs::write(&path, ": not [ valid yaml").unwrap();
        let history = SelectionHistory::init(path, 10);
        assert!(history.is_empty());
    }

    #[test]
    fn remove_values_prunes_empty_selections() {
        let (_dir, mut history) = temp_history(10);
        history.push(sel(&["docs/a.doc.md"]));
        history.push(sel(&["docs/a.doc.md", "docs/b.doc.md"]));

        history.remove_values(&[sp("docs/a.doc.md")]);
        assert_eq!(history.len(), 1);
        assert_eq!(history.current(), Some(&sel(&["docs/b.doc.md"])));
    }

    #[test]
    fn replace_values_renames_across_history() {
        let (_dir, mut history) = temp_history(10);
        history.push(sel(&["docs/a.doc.md"]));
        history.replace_values(&[(sp("docs/a.doc.md"), sp("docs/renamed.doc.md"))]);
        assert_eq!(history.current(), Some(&sel(&["docs/renamed.doc.md"])));
    }

    #[test]
    fn refresh_drops_dead_paths() {
        let (_dir, mut history) = temp_history(10);
        history.push(sel(&["docs/alive.doc.md", "docs/dead.doc.md"]));
        history.refresh(|p| p.to_string().contains("alive"));
        assert_eq!(history.current(), Some(&sel(&["docs/alive.doc.md"])));
    }
}
