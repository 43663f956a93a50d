// SPDX-License-Identifier: MIT OR Apache-2.0
//! Item file format: YAML frontmatter read/write and sidecar metadata.
//!
//! Frontmatter-supporting formats are stored as a `---`-fenced YAML block
//! holding the item's metadata, followed by the body. Binary formats keep
//! their metadata in a sidecar `<file>.meta.yml`.

use crate::filenames::parse_item_filename;
use kash_core::formats::Format;
use kash_core::items::{Item, ItemType};
use kash_error::{KashError, Result};
use serde_yaml::Mapping;
use std::path::Path;
use tracing::debug;

/// Suffix for binary sidecar metadata files.
pub const META_SUFFIX: &str = ".meta.yml";

/// Split a file's content into its frontmatter mapping and body, when a
/// frontmatter block is present.
#[must_use]
pub fn split_frontmatter(content: &str) -> Option<(&str, &str)> {
    let rest = content.strip_prefix("---\n")?;
    // The closing fence is a `---` line (possibly the last, unterminated).
    let (yaml, body) = match rest.find("\n---\n") {
        Some(end) => (&rest[..end + 1], &rest[end + 5..]),
        None => match rest.strip_suffix("\n---") {
            Some(yaml) => (yaml, ""),
            None => return None,
        },
    };
    Some((yaml, body))
}

/// Render an item as frontmatter plus body.
fn compose(item: &Item, normalize: bool) -> Result<String> {
    let metadata = item.metadata();
    let yaml = serde_yaml::to_string(&metadata)
        .map_err(|e| KashError::Serialization(format!("item metadata: {e}")))?;

    let mut body = item.body_text().to_string();
    if normalize {
        body = normalize_body(&body);
    }

    let mut out = String::with_capacity(yaml.len() + body.len() + 16);
    out.push_str("---\n");
    out.push_str(&yaml);
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("---\n");
    out.push_str(&body);
    Ok(out)
}

/// Body normalization: trim trailing whitespace per line end, single
/// trailing newline.
#[must_use]
pub fn normalize_body(body: &str) -> String {
    let joined: String = body
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    let trimmed = joined.trim_end_matches('\n');
    if trimmed.is_empty() {
        return String::new();
    }
    format!("{trimmed}\n")
}

fn atomic_write(path: &Path, content: &str) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| KashError::InvalidFilename(path.display().to_string()))?;
    std::fs::create_dir_all(parent)
        .map_err(|e| KashError::io(format!("create dir {}", parent.display()), e))?;
    let tmp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| KashError::io(format!("temp file in {}", parent.display()), e))?;
    std::fs::write(tmp.path(), content)
        .map_err(|e| KashError::io(format!("write {}", tmp.path().display()), e))?;
    tmp.persist(path)
        .map_err(|e| KashError::io(format!("rename into {}", path.display()), e.error))?;
    Ok(())
}

/// Write a text item to `path` with YAML frontmatter, atomically.
///
/// # Errors
///
/// Returns an error if the item's format does not support frontmatter or
/// the write fails.
pub fn write_item(item: &Item, path: &Path, normalize: bool) -> Result<()> {
    let supports = item.format.is_none_or(|f| f.supports_frontmatter());
    if !supports {
        return Err(KashError::InvalidOperation(format!(
            "format does not support frontmatter: {:?}",
            item.format
        )));
    }
    atomic_write(path, &compose(item, normalize)?)
}

/// Write the sidecar metadata file for a binary item.
///
/// # Errors
///
/// Returns an error if the write fails.
pub fn write_sidecar_meta(item: &Item, path: &Path) -> Result<()> {
    let yaml = serde_yaml::to_string(&item.metadata())
        .map_err(|e| KashError::Serialization(format!("sidecar metadata: {e}")))?;
    atomic_write(&sidecar_path(path), &yaml)
}

/// The sidecar metadata path for a binary file.
#[must_use]
pub fn sidecar_path(path: &Path) -> std::path::PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(META_SUFFIX);
    std::path::PathBuf::from(s)
}

/// Read an item from a file.
///
/// For frontmatter-supporting formats the YAML block populates the
/// metadata and the remainder becomes the body; files without a block get
/// metadata inferred from the filename. Binary formats load sidecar
/// metadata when present.
///
/// # Errors
///
/// Returns [`KashError::SkippableError`] for files that structurally
/// cannot be parsed as items (unrecognized name, undecodable content,
/// malformed frontmatter).
pub fn read_item(path: &Path, base_dir: &Path) -> Result<Item> {
    let parsed = parse_item_filename(path)
        .map_err(|e| KashError::SkippableError(format!("not an item file: {e}")))?;

    let format = parsed.format;
    let supports_frontmatter = format.is_some_and(|f| f.supports_frontmatter());

    let mut item = if supports_frontmatter {
        let content = std::fs::read_to_string(path)
            .map_err(|e| KashError::SkippableError(format!("unreadable: {}: {e}", path.display())))?;

        match split_frontmatter(&content) {
            Some((yaml, body)) => {
                let metadata: Mapping = serde_yaml::from_str(yaml).map_err(|e| {
                    KashError::SkippableError(format!(
                        "malformed frontmatter: {}: {e}",
                        path.display()
                    ))
                })?;
                let mut item = Item::from_metadata(&metadata);
                if item.format.is_none() {
                    item.format = format;
                }
                item.body = Some(body.to_string());
                item
            }
            None => {
                debug!(
                    target: "kash.store",
                    path = %path.display(),
                    "no frontmatter block; inferring metadata from filename"
                );
                let mut item = Item::new(
                    parsed
                        .item_type
                        .or(format.map(ItemType::for_format))
                        .unwrap_or(ItemType::Doc),
                );
                item.format = format;
                item.body = Some(content);
                item
            }
        }
    } else {
        // Binary: metadata from the sidecar, or inferred from the filename.
        let sidecar = sidecar_path(path);
        let mut item = if sidecar.exists() {
            let yaml = std::fs::read_to_string(&sidecar)
                .map_err(|e| KashError::io(format!("read {}", sidecar.display()), e))?;
            let metadata: Mapping = serde_yaml::from_str(&yaml).map_err(|e| {
                KashError::SkippableError(format!("malformed sidecar: {}: {e}", sidecar.display()))
            })?;
            Item::from_metadata(&metadata)
        } else {
            let mut item = Item::new(
                parsed
                    .item_type
                    .or(format.map(ItemType::for_format))
                    .unwrap_or(ItemType::Resource),
            );
            item.format = format.or(Some(Format::Binary));
            item
        };
        item.external_path = Some(path.to_path_buf());
        item
    };

    item.file_ext = parsed.file_ext;
    if item.title.is_none() && parsed.name.is_empty() {
        return Err(KashError::SkippableError(format!(
            "empty filename: {}",
            path.display()
        )));
    }

    // Record the store path when the file is inside the store.
    if let Ok(rel) = path.strip_prefix(base_dir) {
        if let Ok(sp) = kash_core::paths::StorePath::from_rel_path(rel) {
            item.store_path = Some(sp);
        }
    }

    if let Ok(meta) = path.metadata() {
        if item.modified_at.is_none() {
            if let Ok(mtime) = meta.modified() {
                item.set_modified(mtime);
            }
        }
    }

    Ok(item)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
