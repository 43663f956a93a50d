// SPDX-License-Identifier: MIT OR Apache-2.0
//! kash-store
//!
//! The workspace file store.
//!
//! Responsibilities:
//! - choose unique, slugified store paths for items
//! - persist items as files with YAML frontmatter (sidecar metadata for
//!   binaries) using atomic writes
//! - maintain the item-id index used for rerun avoidance
//! - archive/unarchive, ignore filters, and store walks
//! - the persisted selection history and workspace param state

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Store filename grammar: folders, suffixes, parsing.
pub mod filenames;
/// Item file format: frontmatter read/write and sidecar metadata.
pub mod frontmatter;
/// Ignore filters (`.kashignore` and defaults).
pub mod ignore;
/// Workspace param state persisted to `params.yml`.
pub mod params_state;
/// Selections and the persisted selection history.
pub mod selections;
/// The `FileStore` itself.
pub mod store;
/// Slug uniquification.
pub mod uniquifier;
/// Workspace layout and discovery.
pub mod workspace;

pub use filenames::{folder_for_type, join_suffix, parse_item_filename, ParsedFilename};
pub use frontmatter::{read_item, write_item};
pub use ignore::IgnoreChecker;
pub use params_state::ParamState;
pub use selections::{Selection, SelectionHistory};
pub use store::FileStore;
pub use workspace::{check_workspace_name, enclosing_ws_dir, is_ws_dir, MetadataDirs};
