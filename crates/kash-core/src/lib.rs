// SPDX-License-Identifier: MIT OR Apache-2.0
//! kash-core
//!
//! Core data model for the kash content pipeline engine.
//!
//! Responsibilities:
//! - the `Item` record and its taxonomy (type, state, format)
//! - the `StorePath` grammar (`@`-mentions, `~store_name/` prefixes)
//! - URL canonicalization and media-service matching
//! - `Operation` fingerprints and `Source` lineage
//! - the composable `Precondition` algebra
//! - typed action parameters with JSON-schema export

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// File format and extension taxonomy with content detection.
pub mod formats;
/// The central `Item` record, its identity, and its relations.
pub mod items;
/// Operation fingerprints, inputs, and per-item lineage.
pub mod operations;
/// Typed parameter declarations and raw/typed value sets.
pub mod params;
/// Store-relative paths with `@`-mention syntax.
pub mod paths;
/// Composable boolean predicates over items.
pub mod preconditions;
/// URL validation, normalization, and media-service canonicalization.
pub mod urls;

pub use formats::{detect_file_format, FileExt, Format, MediaType};
pub use items::{IdKind, Item, ItemId, ItemRelations, ItemType, State, SLUG_MAX_LEN, UNTITLED};
pub use operations::{Input, Operation, OperationSummary, Source};
pub use params::{Param, ParamType, RawParamValues, RawValue, TypedParamValues, TypedValue};
pub use paths::StorePath;
pub use preconditions::Precondition;
pub use urls::{canonicalize_url, is_url, MediaMatch, MediaService};
