// SPDX-License-Identifier: MIT OR Apache-2.0
//! Workspace param state persisted to `params.yml`.

use kash_core::params::{RawParamValues, RawValue};
use kash_error::{KashError, Result};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Workspace-level parameter values, persisted as YAML.
///
/// These act as defaults under explicit per-invocation values.
#[derive(Debug)]
pub struct ParamState {
    path: PathBuf,
    values: RawParamValues,
}

impl ParamState {
    /// Load from a YAML file; a missing file is an empty state and
    /// unparseable YAML is logged and discarded.
    #[must_use]
    pub fn init(path: PathBuf) -> Self {
        let values = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => RawParamValues::new(),
            Ok(content) => match serde_yaml::from_str::<RawParamValues>(&content) {
                Ok(values) => values,
                Err(e) => {
                    warn!(
                        target: "kash.store",
                        path = %path.display(),
                        error = %e,
                        "unparseable params file, starting empty"
                    );
                    RawParamValues::new()
                }
            },
            Err(_) => RawParamValues::new(),
        };
        Self { path, values }
    }

    /// The current raw values.
    #[must_use]
    pub fn get_raw_values(&self) -> &RawParamValues {
        &self.values
    }

    /// Set a value and persist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn set(&mut self, name: impl Into<String>, value: RawValue) -> Result<()> {
        self.values.0.insert(name.into(), value);
        self.save()
    }

    /// Remove a value and persist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn unset(&mut self, name: &str) -> Result<()> {
        self.values.0.remove(name);
        self.save()
    }

    fn save(&self) -> Result<()> {
        let content = serde_yaml::to_string(&self.values)
            .map_err(|e| KashError::Serialization(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| KashError::io(format!("create dir {}", parent.display()), e))?;
        }
        std::fs::write(&self.path, content)
            .map_err(|e| KashError::io(format!("write {}", self.path.display()), e))
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

    #[test]
    fn roundtrips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.yml");
        {
            let mut state = ParamState::init(path.clone());
            state.set("model", RawValue::Str("gpt-4o".into())).unwrap();
            state.set("verbose", RawValue::Bool(true)).unwrap();
        }
        let state = ParamState::init(path);
        assert_eq!(
            state.get_raw_values().get("model"),
            Some(&RawValue::Str("gpt-4o".into()))
        );
        assert_eq!(
            state.get_raw_values().get("verbose"),
            Some(&RawValue::Bool(true))
        );
    }

    #[test]
    fn unset_removes() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = ParamState::init(dir.path().join("params.yml"));
        state.set("a", RawValue::Str("1".into())).unwrap();
        state.unset("a").unwrap();
        assert!(state.get_raw_values().get("a").is_none());
    }

    #[test]
    fn missing_and_corrupt_files_start_empty() {
        let dir = tempfile::tempdir().unwrap();
        let state = ParamState::init(dir.path().join("missing.yml"));
        assert!(state.get_raw_values().0.is_empty());

        let path = dir.path().join("bad.yml");
        std::fs::write(&path, "[{]").unwrap();
        let state = ParamState::init(path);
        assert!(state.get_raw_values().0.is_empty());
    }
}
