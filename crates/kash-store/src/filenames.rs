// SPDX-License-Identifier: MIT OR Apache-2.0
//! Store filename grammar.
//!
//! Typed items are stored as `{slug}.{type}.{ext}`; extensions use plain
//! `{slug}.py` and scripts `{slug}.script.ksh`. Each item type has a folder
//! named by its plural.

use kash_core::formats::{FileExt, Format};
use kash_core::items::ItemType;
use kash_error::{KashError, Result};
use std::path::{Path, PathBuf};

/// Relative folder for an item type (`doc` -> `docs/` etc.).
#[must_use]
pub fn folder_for_type(item_type: ItemType) -> PathBuf {
    PathBuf::from(item_type.folder_name())
}

/// Join a slug and a full suffix: `join_suffix("a_doc", "doc.md")` ->
/// `a_doc.doc.md`.
#[must_use]
pub fn join_suffix(base_slug: &str, full_suffix: &str) -> String {
    format!("{base_slug}.{}", full_suffix.trim_start_matches('.'))
}

/// Parsed parts of a store filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFilename {
    /// The slug (filename up to the type/extension suffix).
    pub name: String,
    /// The item type, when the filename carries one.
    pub item_type: Option<ItemType>,
    /// The format implied by the extension, when unambiguous.
    pub format: Option<Format>,
    /// The recognized file extension.
    pub file_ext: Option<FileExt>,
}

impl ParsedFilename {
    /// The full suffix after the slug (e.g. `doc.md`, `py`, `script.ksh`).
    #[must_use]
    pub fn full_suffix(&self) -> String {
        match self.item_type {
            Some(ItemType::Extension) => FileExt::Py.as_str().to_string(),
            Some(ItemType::Script) => format!("script.{}", FileExt::Ksh.as_str()),
            Some(t) => match self.file_ext {
                Some(ext) => format!("{t}.{ext}"),
                None => t.to_string(),
            },
            None => self
                .file_ext
                .map(|e| e.as_str().to_string())
                .unwrap_or_default(),
        }
    }
}

/// Parse a store file path into name, item type, format, and extension.
///
/// Recognized shapes, by example:
/// - `my_notes.doc.md` -> (`my_notes`, doc, markdown, md)
/// - `my_tool.py` -> (`my_tool`, extension, python, py)
/// - `my_task.script.ksh` -> (`my_task`, script, none, ksh)
/// - `data.csv` -> (`data`, none, csv, csv)
///
/// # Errors
///
/// Returns [`KashError::InvalidFilename`] when the extension is not
/// recognized; store files are expected to have one.
pub fn parse_item_filename(path: &Path) -> Result<ParsedFilename> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| KashError::InvalidFilename(path.display().to_string()))?;

    let mut parts: Vec<&str> = filename.split('.').collect();
    if parts.len() < 2 {
        return Err(KashError::InvalidFilename(format!(
            "no file extension: {filename}"
        )));
    }

    let ext_str = parts.pop().unwrap_or_default();
    let file_ext = FileExt::parse(ext_str)
        .ok_or_else(|| KashError::InvalidFilename(format!("unrecognized extension: {filename}")))?;

    // A `.py` file in the store is an extension module.
    if file_ext == FileExt::Py && parts.len() == 1 {
        return Ok(ParsedFilename {
            name: parts[0].to_string(),
            item_type: Some(ItemType::Extension),
            format: Some(Format::Python),
            file_ext: Some(file_ext),
        });
    }

    // `name.script.ksh` is a script.
    if file_ext == FileExt::Ksh {
        if parts.last() == Some(&"script") {
            parts.pop();
        }
        return Ok(ParsedFilename {
            name: parts.join("."),
            item_type: Some(ItemType::Script),
            format: None,
            file_ext: Some(file_ext),
        });
    }

    // `name.type.ext` when the middle part names a type.
    let item_type = match parts.last().and_then(|part| ItemType::parse(part)) {
        Some(t) => {
            parts.pop();
            Some(t)
        }
        None => None,
    };

    Ok(ParsedFilename {
        name: parts.join("."),
        item_type,
        format: Format::guess_by_file_ext(file_ext),
        file_ext: Some(file_ext),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folders_are_plural() {
        assert_eq!(folder_for_type(ItemType::Doc), PathBuf::from("docs"));
        assert_eq!(
            folder_for_type(ItemType::Resource),
            PathBuf::from("resources")
        );
    }

    #[test]
    fn join_suffix_strips_leading_dot() {
        assert_eq!(join_suffix("a", "doc.md"), "a.doc.md");
        assert_eq!(join_suffix("a", ".doc.md"), "a.doc.md");
    }

    #[test]
    fn parses_typed_filenames() {
        let parsed = parse_item_filename(Path::new("docs/my_notes.doc.md")).unwrap();
        assert_eq!(parsed.name, "my_notes");
        assert_eq!(parsed.item_type, Some(ItemType::Doc));
        assert_eq!(parsed.format, Some(Format::Markdown));
        assert_eq!(parsed.file_ext, Some(FileExt::Md));
        assert_eq!(parsed.full_suffix(), "doc.md");
    }

    #[test]
    fn parses_untyped_filenames() {
        let parsed = parse_item_filename(Path::new("data.csv")).unwrap();
        assert_eq!(parsed.name, "data");
        assert_eq!(parsed.item_type, None);
        assert_eq!(parsed.format, Some(Format::Csv));
        assert_eq!(parsed.full_suffix(), "csv");
    }

    #[test]
    fn parses_extension_and_script_exceptions() {
        let ext = parse_item_filename(Path::new("extensions/my_tool.py")).unwrap();
        assert_eq!(ext.item_type, Some(ItemType::Extension));
        assert_eq!(ext.name, "my_tool");
        assert_eq!(ext.full_suffix(), "py");

        let script = parse_item_filename(Path::new("scripts/my_task.script.ksh")).unwrap();
        assert_eq!(script.item_type, Some(ItemType::Script));
        assert_eq!(script.name, "my_task");
        assert_eq!(script.full_suffix(), "script.ksh");
    }

    #[test]
    fn rejects_unrecognized_extensions() {
        assert!(matches!(
            parse_item_filename(Path::new("thing.exe")),
            Err(KashError::InvalidFilename(_))
        ));
        assert!(matches!(
            parse_item_filename(Path::new("no_extension")),
            Err(KashError::InvalidFilename(_))
        ));
    }

    #[test]
    fn dots_in_slug_are_preserved(){
        let parsed = parse_item_filename(Path::new("v1.2_notes.doc.md")).unwrap();
        assert_eq!(parsed.name, "v1.2_notes");
        assert_eq!(parsed.item_type, Some(ItemType::Doc));
    }
}
