// SPDX-License-Identifier: MIT OR Apache-2.0
//! Unified error taxonomy for the kash content pipeline engine.
//!
//! Every kash error is a [`KashError`] variant with a human-readable message.
//! The taxonomy separates *non-fatal* errors (which per-item loops catch,
//! log, and skip) from fatal ones, and includes two sentinel variants that
//! are used for control flow without unwinding: [`KashError::SkippableError`]
//! (a loader error tolerated during bulk walks) and [`KashError::SkipItem`]
//! (raised by an action body to pass an item through unchanged).

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::fmt;

/// Convenience alias used throughout the kash crates.
pub type Result<T> = std::result::Result<T, KashError>;

// ---------------------------------------------------------------------------
// ErrorSeverity
// ---------------------------------------------------------------------------

/// How the execution pipeline should react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    /// Caught by per-item loops; logged and counted, processing continues.
    NonFatal,
    /// Propagates and aborts the current operation.
    Fatal,
    /// Silently skipped during bulk walks (malformed files etc.).
    Skippable,
    /// Not an error at all: a control-flow sentinel.
    Sentinel,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NonFatal => "non_fatal",
            Self::Fatal => "fatal",
            Self::Skippable => "skippable",
            Self::Sentinel => "sentinel",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// KashError
// ---------------------------------------------------------------------------

/// The kash error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum KashError {
    /// A user-supplied argument is malformed or refers to nothing.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A requested state transition is impossible (e.g. selection history
    /// navigation past either end).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The workspace or runtime is not in a valid state (no workspace, etc.).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A store file that should exist does not.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// A store file unexpectedly already exists.
    #[error("file exists: {0}")]
    FileExists(String),

    /// A filename does not follow the store's filename grammar.
    #[error("invalid filename: {0}")]
    InvalidFilename(String),

    /// Input was not a valid store path (absolute path, URL, empty, etc.).
    #[error("invalid store path: {0}")]
    InvalidStorePath(String),

    /// A precondition rejected an item.
    #[error("precondition failure: {0}")]
    PreconditionFailure(String),

    /// A per-file loader error that should be silently skipped during
    /// bulk walks.
    #[error("skippable: {0}")]
    SkippableError(String),

    /// Sentinel raised inside an action body to pass the current item
    /// through unchanged.
    #[error("skip item")]
    SkipItem,

    /// An action produced no usable output from non-empty input.
    #[error("content error: {0}")]
    ContentError(String),

    /// An upstream API (LLM etc.) returned an unusable result.
    #[error("api result error: {0}")]
    ApiResultError(String),

    /// A missing external tool or misconfiguration.
    #[error("setup error: {0}")]
    SetupError(String),

    /// An underlying I/O failure, annotated with the path or operation.
    #[error("io error: {context}")]
    Io {
        /// What was being done when the failure occurred.
        context: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Metadata or frontmatter could not be serialized or parsed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl KashError {
    /// Wrap an [`std::io::Error`] with a short context string.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Severity classification used by the execution pipeline and walkers.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::ApiResultError(_)
            | Self::ContentError(_)
            | Self::InvalidInput(_)
            | Self::PreconditionFailure(_) => ErrorSeverity::NonFatal,
            Self::SkippableError(_) => ErrorSeverity::Skippable,
            Self::SkipItem => ErrorSeverity::Sentinel,
            _ => ErrorSeverity::Fatal,
        }
    }

    /// True for the non-fatal set caught by per-item loops:
    /// `ApiResultError`, `ContentError`, `InvalidInput`, `PreconditionFailure`.
    pub fn is_nonfatal(&self) -> bool {
        self.severity() == ErrorSeverity::NonFatal
    }

    /// True for loader errors that bulk walks silently skip.
    pub fn is_skippable(&self) -> bool {
        self.severity() == ErrorSeverity::Skippable
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
