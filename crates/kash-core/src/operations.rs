// SPDX-License-Identifier: MIT OR Apache-2.0
//! Operation fingerprints, inputs, and per-item lineage.
//!
//! An [`Operation`] is the canonical fingerprint of an action invocation:
//! the action name, its inputs (store paths with content hashes), and its
//! option values. A [`Source`] attaches an operation plus an output index to
//! an item as its provenance, and is the identity of non-concept, non-URL
//! items.

use crate::paths::StorePath;
use kash_error::{KashError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

fn shell_quote(s: &str) -> String {
    if s.chars().any(char::is_whitespace) {
        format!("'{s}'")
    } else {
        s.to_string()
    }
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// An input to an operation: a store path plus an optional content hash.
///
/// Two inputs with hashes are equal iff the hashes match, even when the
/// paths have drifted. Inputs without hashes compare by path.
#[derive(Debug, Clone)]
pub struct Input {
    /// Store path of the input at the time the operation ran.
    pub path: StorePath,
    /// Content hash (`sha1:{hex}`), when the input was a stored file.
    pub hash: Option<String>,
}

impl Input {
    /// Create an input with a content hash.
    pub fn new(path: StorePath, hash: impl Into<String>) -> Self {
        Self {
            path,
            hash: Some(hash.into()),
        }
    }

    /// Parse `some/path@sha1:hex` or a bare path.
    ///
    /// # Errors
    ///
    /// Returns an error if the path part is not a valid store path.
    pub fn parse(s: &str) -> Result<Self> {
        match s.rsplit_once('@') {
            Some((path, hash)) if !path.is_empty() && hash.contains(':') => Ok(Self {
                path: StorePath::parse(path)?,
                hash: Some(hash.to_string()),
            }),
            _ => Ok(Self {
                path: StorePath::parse(s)?,
                hash: None,
            }),
        }
    }

    /// Canonical `path@hash` form (bare path when there is no hash).
    #[must_use]
    pub fn path_and_hash(&self) -> String {
        match &self.hash {
            Some(hash) => format!("{}@{}", self.path, hash),
            None => self.path.to_string(),
        }
    }
}

impl PartialEq for Input {
    fn eq(&self, other: &Self) -> bool {
        match (&self.hash, &other.hash) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.path == other.path,
            _ => false,
        }
    }
}

impl Eq for Input {}

impl Hash for Input {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.hash {
            Some(h) => h.hash(state),
            None => self.path.hash(state),
        }
    }
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path_and_hash())
    }
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// A single operation: an action name together with the inputs and options
/// supplied to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// Name of the action that ran.
    pub action_name: String,
    /// The operation's inputs, in argument order.
    pub arguments: Vec<Input>,
    /// Option values as `name -> value` strings.
    pub options: BTreeMap<String, String>,
}

impl Operation {
    /// Create an operation.
    pub fn new(
        action_name: impl Into<String>,
        arguments: Vec<Input>,
        options: BTreeMap<String, String>,
    ) -> Self {
        Self {
            action_name: action_name.into(),
            arguments,
            options,
        }
    }

    /// Brief summary (just the action name) for item history.
    #[must_use]
    pub fn summary(&self) -> OperationSummary {
        OperationSummary {
            action_name: self.action_name.clone(),
        }
    }

    /// A reconstructable shell form: `action_name --opt1=val1 arg1 arg2`.
    #[must_use]
    pub fn command_line(&self, with_options: bool) -> String {
        let mut parts = vec![self.action_name.clone()];
        if with_options {
            for (k, v) in &self.options {
                parts.push(format!("--{k}={}", shell_quote(v)));
            }
        }
        for arg in &self.arguments {
            parts.push(shell_quote(&arg.path.to_string()));
        }
        parts.join(" ")
    }

    /// Compact canonical form used as the `Source` identity:
    /// `action(arg_path@hash,...;opt1=val1,...)`.
    #[must_use]
    pub fn as_str(&self) -> String {
        let args: Vec<String> = self.arguments.iter().map(Input::path_and_hash).collect();
        let mut s = format!("{}({}", self.action_name, args.join(","));
        if !self.options.is_empty() {
            let opts: Vec<String> = self
                .options
                .iter()
                .map(|(k, v)| format!("{k}={}", shell_quote(v)))
                .collect();
            s.push(';');
            s.push_str(&opts.join(","));
        }
        s.push(')');
        s
    }

    /// Parse the compact canonical form produced by [`as_str`](Self::as_str).
    ///
    /// # Errors
    ///
    /// Returns [`KashError::InvalidInput`] if the string is not in canonical
    /// form.
    pub fn parse(s: &str) -> Result<Self> {
        let open = s
            .find('(')
            .ok_or_else(|| KashError::InvalidInput(format!("not an operation: {s:?}")))?;
        let close = s
            .rfind(')')
            .filter(|&i| i > open)
            .ok_or_else(|| KashError::InvalidInput(format!("not an operation: {s:?}")))?;

        let action_name = s[..open].to_string();
        if action_name.is_empty() {
            return Err(KashError::InvalidInput(format!("not an operation: {s:?}")));
        }
        let inner = &s[open + 1..close];

        let (args_str, opts_str) = match inner.split_once(';') {
            Some((a, o)) => (a, Some(o)),
            None => (inner, None),
        };

        let mut arguments = Vec::new();
        for part in args_str.split(',').filter(|p| !p.is_empty()) {
            arguments.push(Input::parse(part)?);
        }

        let mut options = BTreeMap::new();
        if let Some(opts_str) = opts_str {
            for part in opts_str.split(',').filter(|p| !p.is_empty()) {
                let (k, v) = part.split_once('=').ok_or_else(|| {
                    KashError::InvalidInput(format!("bad operation option: {part:?}"))
                })?;
                let v = v.trim_matches('\'');
                options.insert(k.to_string(), v.to_string());
            }
        }

        Ok(Self {
            action_name,
            arguments,
            options,
        })
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Operation({})", self.command_line(true))
    }
}

// Serialized in the frontmatter-friendly shape: arguments as path@hash
// strings.
#[derive(Serialize, Deserialize)]
struct OperationDto {
    action_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    arguments: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    options: BTreeMap<String, String>,
}

impl Serialize for Operation {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let dto = OperationDto {
            action_name: self.action_name.clone(),
            arguments: self.arguments.iter().map(Input::path_and_hash).collect(),
            options: self.options.clone(),
        };
        dto.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Operation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let dto = OperationDto::deserialize(deserializer)?;
        let mut arguments = Vec::with_capacity(dto.arguments.len());
        for s in &dto.arguments {
            arguments.push(Input::parse(s).map_err(serde::de::Error::custom)?);
        }
        Ok(Self {
            action_name: dto.action_name,
            arguments,
            options: dto.options,
        })
    }
}

// ---------------------------------------------------------------------------
// OperationSummary
// ---------------------------------------------------------------------------

/// Brief record of an operation in an item's history: just the action name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSummary {
    /// Name of the action that ran.
    pub action_name: String,
}

impl OperationSummary {
    /// Create a summary for the given action name.
    pub fn new(action_name: impl Into<String>) -> Self {
        Self {
            action_name: action_name.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

fn default_cacheable() -> bool {
    true
}

/// The provenance of an output item: which operation produced it and which
/// of that operation's outputs it is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// The operation that produced the output.
    pub operation: Operation,
    /// Index of this output among the operation's outputs.
    pub output_num: u32,
    /// When false, id-based deduplication and rerun skipping are disabled
    /// for this item (the action relied on something external).
    #[serde(default = "default_cacheable")]
    pub cacheable: bool,
}

impl Source {
    /// Create a source record.
    #[must_use]
    pub fn new(operation: Operation, output_num: u32, cacheable: bool) -> Self {
        Self {
            operation,
            output_num,
            cacheable,
        }
    }

    /// Canonical string identity: `action(args;opts)[output_num]`.
    #[must_use]
    pub fn as_str(&self) -> String {
        format!("{}[{}]", self.operation.as_str(), self.output_num)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
