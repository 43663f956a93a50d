// SPDX-License-Identifier: MIT OR Apache-2.0
//! The central `Item` record, its identity, and its relations.
//!
//! An [`Item`] is any piece of content we may wish to save or operate on: a
//! text document, a URL resource, a config, a chat transcript, etc. Items
//! live in memory until saved; after save they belong to the file store and
//! are referred to by store path.

use crate::formats::{detect_file_format, FileExt, Format};
use crate::operations::{OperationSummary, Source};
use crate::paths::StorePath;
use crate::urls::canonicalize_url;
use chrono::{DateTime, SecondsFormat, Utc};
use kash_error::{KashError, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Title used when no title can be inferred.
pub const UNTITLED: &str = "Untitled";

/// Maximum length of a filename slug.
pub const SLUG_MAX_LEN: usize = 64;

// ---------------------------------------------------------------------------
// ItemType
// ---------------------------------------------------------------------------

/// Kinds of items. The type reflects how the item is used, not necessarily
/// the format of its data: an HTML file can be a resource (imported from the
/// web), a doc (being processed), or an export (generated output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum ItemType {
    Doc,
    Concept,
    Resource,
    Asset,
    Config,
    Export,
    Chat,
    Extension,
    Script,
    Log,
    Table,
}

impl ItemType {
    /// Stable snake_case name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Doc => "doc",
            Self::Concept => "concept",
            Self::Resource => "resource",
            Self::Asset => "asset",
            Self::Config => "config",
            Self::Export => "export",
            Self::Chat => "chat",
            Self::Extension => "extension",
            Self::Script => "script",
            Self::Log => "log",
            Self::Table => "table",
        }
    }

    /// Parse the snake_case name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let t = match s {
            "doc" => Self::Doc,
            "concept" => Self::Concept,
            "resource" => Self::Resource,
            "asset" => Self::Asset,
            "config" => Self::Config,
            "export" => Self::Export,
            "chat" => Self::Chat,
            "extension" => Self::Extension,
            "script" => Self::Script,
            "log" => Self::Log,
            "table" => Self::Table,
            _ => return None,
        };
        Some(t)
    }

    /// Whether items of this type must have a body when saved.
    /// Resources have no body; on concepts it is optional.
    #[must_use]
    pub fn expects_body(&self) -> bool {
        !matches!(self, Self::Resource | Self::Concept)
    }

    /// Whether display titles for this type get a `(stepNN, last_op)`
    /// suffix. Concepts and resources keep clean titles.
    #[must_use]
    pub fn allows_op_suffix(&self) -> bool {
        !matches!(self, Self::Concept | Self::Resource)
    }

    /// Store folder for this type (the plural of the type name).
    #[must_use]
    pub fn folder_name(&self) -> String {
        format!("{}s", self.as_str())
    }

    /// Default item type for a format, mainly as a guess when importing.
    #[must_use]
    pub fn for_format(format: Format) -> Self {
        match format {
            Format::Url | Format::Pdf | Format::Docx | Format::Mp3 | Format::M4a | Format::Mp4 => {
                Self::Resource
            }
            Format::Plaintext
            | Format::Markdown
            | Format::MdHtml
            | Format::Html
            | Format::Yaml
            | Format::Diff
            | Format::Json
            | Format::Csv => Self::Doc,
            Format::Python | Format::Shellscript | Format::Xonsh => Self::Extension,
            Format::Log => Self::Log,
            Format::Jpeg | Format::Png | Format::Gif | Format::Svg => Self::Asset,
            Format::Npz | Format::Binary => Self::Resource,
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Review state of an item. Draft is the default; transient items may be
/// safely auto-archived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum State {
    #[default]
    Draft,
    Reviewed,
    Transient,
}

impl State {
    /// Stable snake_case name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Reviewed => "reviewed",
            Self::Transient => "transient",
        }
    }

    /// Parse the snake_case name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "reviewed" => Some(Self::Reviewed),
            "transient" => Some(Self::Transient),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ItemId
// ---------------------------------------------------------------------------

/// Kinds of identity checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum IdKind {
    Url,
    Concept,
    Source,
}

impl IdKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Url => "url",
            Self::Concept => "concept",
            Self::Source => "source",
        }
    }
}

/// The deduplication key of an item.
///
/// URL resources are identified by their canonical URL, concepts by their
/// canonical title, and other items by their (cacheable) source. Items
/// without a natural id are treated as unique and never deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemId {
    /// The item's type.
    pub item_type: ItemType,
    /// Which identity scheme applies.
    pub kind: IdKind,
    /// The identity value.
    pub value: String,
}

impl ItemId {
    /// Compute the identity for an item, or `None` if it has none.
    #[must_use]
    pub fn for_item(item: &Item) -> Option<Self> {
        if item.item_type == ItemType::Resource && item.format == Some(Format::Url) {
            let url = item.url.as_deref()?;
            return Some(Self {
                item_type: item.item_type,
                kind: IdKind::Url,
                value: canonicalize_url(url),
            });
        }
        if item.item_type == ItemType::Concept {
            let title = item.title.as_deref()?;
            return Some(Self {
                item_type: item.item_type,
                kind: IdKind::Concept,
                value: canonicalize_concept(title),
            });
        }
        match &item.source {
            Some(source) if source.cacheable => Some(Self {
                item_type: item.item_type,
                kind: IdKind::Source,
                value: source.as_str(),
            }),
            _ => None,
        }
    }

    /// Stable string form, e.g. `id:url:https://example.com/page`.
    #[must_use]
    pub fn id_str(&self) -> String {
        format!(
            "id:{}:{}",
            self.kind.as_str(),
            self.value.replace(' ', "_")
        )
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id_str())
    }
}

/// Canonical form of a concept title: trimmed, whitespace collapsed,
/// lowercased.
#[must_use]
pub fn canonicalize_concept(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// ---------------------------------------------------------------------------
// ItemRelations
// ---------------------------------------------------------------------------

/// Relations of an item to other items, stored as store-path or URL strings
/// and resolved lazily through the store (cycles are possible).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRelations {
    /// Items this one was derived from.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub derived_from: Vec<String>,
    /// Items this one is a diff of.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diff_of: Vec<String>,
    /// Items this one cites.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cites: Vec<String>,
}

impl ItemRelations {
    /// True when no relation is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.derived_from.is_empty() && self.diff_of.is_empty() && self.cites.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// A unit of content with typed metadata and either an in-memory body or a
/// stored file.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    /// The kind of item.
    pub item_type: ItemType,
    /// Review state.
    pub state: State,
    /// Title, if known.
    pub title: Option<String>,
    /// Source URL, for URL resources.
    pub url: Option<String>,
    /// Short description.
    pub description: Option<String>,
    /// Format of the body or resource.
    pub format: Option<Format>,
    /// File extension, when it differs from the format default.
    pub file_ext: Option<FileExt>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-modified timestamp, if saved before.
    pub modified_at: Option<DateTime<Utc>>,
    /// Body text, for text formats.
    pub body: Option<String>,
    /// Pointer to content not yet saved into the store.
    pub external_path: Option<PathBuf>,
    /// Original filename at import time.
    pub original_filename: Option<String>,
    /// Path within the store, once saved.
    pub store_path: Option<StorePath>,
    /// Relations to other items.
    pub relations: ItemRelations,
    /// The operation that created this item.
    pub source: Option<Source>,
    /// Bounded history of operations applied to this item.
    pub history: Vec<OperationSummary>,
    /// Thumbnail image URL, if any.
    pub thumbnail_url: Option<String>,
    /// Open metadata dictionary.
    pub extra: BTreeMap<String, Value>,
}

impl Item {
    /// Create an empty draft item of the given type, timestamped now.
    #[must_use]
    pub fn new(item_type: ItemType) -> Self {
        Self {
            item_type,
            state: State::default(),
            title: None,
            url: None,
            description: None,
            format: None,
            file_ext: None,
            created_at: Utc::now(),
            modified_at: None,
            body: None,
            external_path: None,
            original_filename: None,
            store_path: None,
            relations: ItemRelations::default(),
            source: None,
            history: Vec::new(),
            thumbnail_url: None,
            extra: BTreeMap::new(),
        }
    }

    /// Create a URL resource item for a (canonicalized) URL.
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        let mut item = Self::new(ItemType::Resource);
        item.format = Some(Format::Url);
        item.url = Some(canonicalize_url(url));
        item
    }

    /// Create an item pointing at an external file, inferring format and
    /// extension from the filename or content. Does not read the body.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or cannot be read for
    /// content sniffing.
    pub fn from_external_path(path: &Path, item_type: Option<ItemType>) -> Result<Self> {
        if !path.exists() {
            return Err(KashError::FileNotFound(path.display().to_string()));
        }
        let file_ext = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(FileExt::parse);
        let format = match file_ext.and_then(Format::guess_by_file_ext) {
            Some(f) => Some(f),
            None => detect_file_format(path)?,
        };

        let item_type = item_type.unwrap_or_else(|| {
            match format {
                Some(f) if f.supports_frontmatter() => ItemType::Doc,
                _ => ItemType::Resource,
            }
        });

        let mut item = Self::new(item_type);
        item.format = format;
        item.file_ext = file_ext;
        item.external_path = Some(path.to_path_buf());
        item.original_filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string);

        if let Ok(meta) = path.metadata() {
            if let Ok(mtime) = meta.modified() {
                item.modified_at = Some(DateTime::<Utc>::from(mtime));
            }
        }
        Ok(item)
    }

    /// Sanity check that the item is consistent and complete enough to save.
    ///
    /// # Errors
    ///
    /// Returns [`KashError::InvalidInput`] when the format is missing, the
    /// body is missing for a body-bearing type, or `file_ext` conflicts with
    /// the format.
    pub fn validate(&self) -> Result<()> {
        let Some(format) = self.format else {
            return Err(KashError::InvalidInput(format!(
                "item has no format: {}",
                self.fmt_loc()
            )));
        };
        if self.item_type.expects_body()
            && format.has_body()
            && self.body.as_deref().is_none_or(str::is_empty)
            && self.external_path.is_none()
        {
            return Err(KashError::InvalidInput(format!(
                "item type `{}` expects a body but has none: {}",
                self.item_type,
                self.fmt_loc()
            )));
        }
        if let (Some(ext), Some(format_ext)) = (self.file_ext, format.file_ext()) {
            if ext != format_ext {
                return Err(KashError::InvalidInput(format!(
                    "file extension `{ext}` does not match format `{format}`: {}",
                    self.fmt_loc()
                )));
            }
        }
        Ok(())
    }

    /// Whether the item's format is binary.
    #[must_use]
    pub fn is_binary(&self) -> bool {
        self.format.is_some_and(|f| f.is_binary())
    }

    /// Body text; empty for bodiless items. Must not be called on binary
    /// items (their content lives in files, not strings).
    #[must_use]
    pub fn body_text(&self) -> &str {
        self.body.as_deref().unwrap_or("")
    }

    /// The file extension to use, inferring from the format when not set.
    ///
    /// # Errors
    ///
    /// Returns an error when no extension can be determined.
    pub fn get_file_ext(&self) -> Result<FileExt> {
        if let Some(ext) = self.file_ext {
            return Ok(ext);
        }
        self.format
            .and_then(|f| f.file_ext())
            .ok_or_else(|| {
                KashError::InvalidFilename(format!(
                    "cannot infer file extension for item: {}",
                    self.fmt_loc()
                ))
            })
    }

    /// The full filename suffix for this item, e.g. `doc.md`.
    /// Extensions use plain `py`; scripts use `script.ksh`.
    ///
    /// # Errors
    ///
    /// Returns an error when the extension cannot be determined.
    pub fn full_suffix(&self) -> Result<String> {
        Ok(match self.item_type {
            ItemType::Extension => FileExt::Py.as_str().to_string(),
            ItemType::Script => format!("script.{}", FileExt::Ksh.as_str()),
            _ => format!("{}.{}", self.item_type, self.get_file_ext()?),
        })
    }

    /// Set creation time from a filesystem timestamp.
    pub fn set_created(&mut self, time: std::time::SystemTime) {
        self.created_at = DateTime::<Utc>::from(time);
    }

    /// Set modification time from a filesystem timestamp.
    pub fn set_modified(&mut self, time: std::time::SystemTime) {
        self.modified_at = Some(DateTime::<Utc>::from(time));
    }

    // -- Titles and slugs ------------------------------------------------

    /// Get or infer a title, falling back to URL, filename stem,
    /// description, or body text. For types that allow it, appends a
    /// `(stepNN, last_op)` suffix naming the last operation.
    #[must_use]
    pub fn abbrev_title(&self, max_len: usize, add_ops_suffix: bool) -> String {
        if self.title.is_none() {
            if let Some(url) = &self.url {
                return abbrev_str(url, max_len);
            }
            if let Some(stem) = self.path_stem() {
                return abbrev_str(&stem, max_len);
            }
        }

        let raw = self
            .title
            .clone()
            .or_else(|| self.description.clone())
            .or_else(|| {
                if self.is_binary() {
                    None
                } else {
                    self.body.as_deref().map(|b| abbrev_str(b.trim(), max_len))
                }
            })
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| UNTITLED.to_string());

        let mut suffix = String::new();
        if add_ops_suffix && self.item_type.allows_op_suffix() {
            if let Some(last_op) = self.history.last() {
                let step_num = self.history.len() + 1;
                suffix = format!(" (step{step_num:02}, {})", last_op.action_name);
            }
        }

        let shorter_len = max_len.saturating_sub(suffix.len()).max(20).min(max_len);
        let clean = abbrev_str(&collapse_ws(&html_to_plaintext(&raw)), shorter_len);

        if suffix.len() + clean.len() <= max_len {
            format!("{clean}{suffix}")
        } else {
            clean
        }
    }

    fn path_stem(&self) -> Option<String> {
        let from_store = self
            .store_path
            .as_ref()
            .and_then(|sp| sp.file_stem().map(str::to_string));
        let from_external = || {
            self.external_path
                .as_ref()
                .and_then(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
        };
        let from_original = || {
            self.original_filename
                .as_ref()
                .map(|n| Path::new(n))
                .and_then(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
        };
        from_store.or_else(from_external).or_else(from_original)
    }

    /// Readable slugified title for filenames. May not be unique.
    #[must_use]
    pub fn slug_name(&self, max_len: usize) -> String {
        slugify(&self.abbrev_title(max_len, true), max_len)
    }

    /// Formatted store path, external path, or title, for messages.
    #[must_use]
    pub fn fmt_loc(&self) -> String {
        if let Some(sp) = &self.store_path {
            sp.display_str()
        } else if let Some(ext) = &self.external_path {
            ext.display().to_string()
        } else {
            format!("{:?}", self.abbrev_title(64, false))
        }
    }

    // -- Copies ----------------------------------------------------------

    /// Copy with `store_path` and `modified_at` cleared; optionally reset
    /// `created_at` to now.
    #[must_use]
    pub fn new_copy(&self, update_timestamp: bool) -> Self {
        let mut copy = self.clone();
        copy.store_path = None;
        copy.modified_at = None;
        if update_timestamp {
            copy.created_at = Utc::now();
        }
        copy
    }

    /// Copy, merging in the set fields of `other` (the other item's fields
    /// take precedence). Resets `store_path`.
    #[must_use]
    pub fn merged_copy(&self, other: &Item) -> Self {
        let mut merged = self.new_copy(false);
        merged.item_type = other.item_type;
        merged.state = other.state;
        if other.title.is_some() {
            merged.title = other.title.clone();
        }
        if other.url.is_some() {
            merged.url = other.url.clone();
        }
        if other.description.is_some() {
            merged.description = other.description.clone();
        }
        if other.format.is_some() {
            merged.format = other.format;
        }
        if other.file_ext.is_some() {
            merged.file_ext = other.file_ext;
        }
        if other.body.is_some() {
            merged.body = other.body.clone();
        }
        if !other.relations.is_empty() {
            merged.relations = other.relations.clone();
        }
        if other.source.is_some() {
            merged.source = other.source.clone();
        }
        if !other.history.is_empty() {
            merged.history = other.history.clone();
        }
        if other.thumbnail_url.is_some() {
            merged.thumbnail_url = other.thumbnail_url.clone();
        }
        for (k, v) in &other.extra {
            merged.extra.insert(k.clone(), v.clone());
        }
        merged
    }

    /// Derive a new item of the given type from this one: clears
    /// `store_path`, updates `created_at`, points `derived_from` at this
    /// item's store path (or propagates this item's own `derived_from` when
    /// unsaved), and applies the active action's title template when a new
    /// title was not set explicitly.
    #[must_use]
    pub fn derived_copy(
        &self,
        new_type: ItemType,
        title_template: Option<&str>,
        action_name: Option<&str>,
    ) -> Self {
        let derived_from: Vec<String> = match &self.store_path {
            Some(sp) => vec![sp.to_string()],
            None => {
                if self.relations.derived_from.is_empty() {
                    warn!(
                        target: "kash.items",
                        item = %self.fmt_loc(),
                        "deriving from an unsaved item; derived_from relation will be empty"
                    );
                } else {
                    info!(
                        target: "kash.items",
                        item = %self.fmt_loc(),
                        "deriving from an unsaved item; propagating its derived_from relation"
                    );
                }
                self.relations.derived_from.clone()
            }
        };

        let mut derived = self.new_copy(true);
        derived.item_type = new_type;
        derived.relations.derived_from = derived_from;

        // External resource paths only make sense for resources.
        if new_type != ItemType::Resource {
            derived.external_path = None;
        }

        if let Some(template) = title_template {
            let title = self.title.clone().unwrap_or_else(|| UNTITLED.to_string());
            derived.title = Some(
                template
                    .replace("{title}", &title)
                    .replace("{action_name}", action_name.unwrap_or("")),
            );
        }

        derived
    }

    // -- Identity and history --------------------------------------------

    /// The deduplication identity of this item, or `None` if it should be
    /// treated as unique.
    #[must_use]
    pub fn item_id(&self) -> Option<ItemId> {
        ItemId::for_item(self)
    }

    /// Record this item's provenance and append to its history.
    pub fn update_history(&mut self, source: Source) {
        let summary = source.operation.summary();
        self.source = Some(source);
        self.add_to_history(summary);
    }

    /// Append to the history unless it duplicates the last entry.
    pub fn add_to_history(&mut self, summary: OperationSummary) {
        if self.history.last() != Some(&summary) {
            self.history.push(summary);
        }
    }

    /// Compare content, ignoring timestamps, store path, and trailing
    /// newlines on the body.
    #[must_use]
    pub fn content_equals(&self, other: &Item) -> bool {
        let metadata_matches = self.item_type == other.item_type
            && self.state == other.state
            && self.title == other.title
            && self.url == other.url
            && self.description == other.description
            && self.format == other.format
            && self.file_ext == other.file_ext
            && self.external_path == other.external_path
            && self.relations == other.relations
            && self.source == other.source
            && self.history == other.history
            && self.thumbnail_url == other.thumbnail_url
            && self.extra == other.extra;

        let body_matches = (self.is_binary() == other.is_binary() && self.body == other.body)
            || self.body_text().trim_end() == other.body_text().trim_end();

        metadata_matches && body_matches
    }

    // -- Metadata --------------------------------------------------------

    /// Metadata in a stable key order, suitable for YAML frontmatter.
    /// Excludes the body, external path, store path, and file extension.
    #[must_use]
    pub fn metadata(&self) -> Mapping {
        let mut map = Mapping::new();
        let mut put = |key: &str, value: Value| {
            map.insert(Value::String(key.to_string()), value);
        };

        put("type", Value::String(self.item_type.as_str().to_string()));
        put("state", Value::String(self.state.as_str().to_string()));
        if let Some(title) = &self.title {
            put("title", Value::String(title.clone()));
        }
        if let Some(url) = &self.url {
            put("url", Value::String(url.clone()));
        }
        if let Some(description) = &self.description {
            put("description", Value::String(description.clone()));
        }
        if let Some(format) = self.format {
            put("format", Value::String(format.as_str().to_string()));
        }
        put("created_at", Value::String(format_timestamp(&self.created_at)));
        if let Some(modified_at) = &self.modified_at {
            put("modified_at", Value::String(format_timestamp(modified_at)));
        }
        if let Some(source) = &self.source {
            if let Ok(v) = serde_yaml::to_value(source) {
                put("source", v);
            }
        }
        if !self.relations.is_empty() {
            if let Ok(v) = serde_yaml::to_value(&self.relations) {
                put("relations", v);
            }
        }
        if !self.history.is_empty() {
            if let Ok(v) = serde_yaml::to_value(&self.history) {
                put("history", v);
            }
        }
        if let Some(thumbnail_url) = &self.thumbnail_url {
            put("thumbnail_url", Value::String(thumbnail_url.clone()));
        }
        if !self.extra.is_empty() {
            let extra: Mapping = self
                .extra
                .iter()
                .map(|(k, v)| (Value::String(k.clone()), v.clone()))
                .collect();
            put("extra", Value::Mapping(extra));
        }
        map
    }

    /// Reconstruct an item tolerantly from parsed metadata. Unknown enum
    /// values fall back to defaults with a logged warning; unexpected
    /// fields are dropped with a log entry.
    #[must_use]
    pub fn from_metadata(metadata: &Mapping) -> Self {
        let loc = metadata
            .get(Value::String("title".into()))
            .and_then(Value::as_str)
            .unwrap_or("<unknown>");

        let get_str =
            |key: &str| -> Option<&str> { metadata.get(&Value::String(key.into()))?.as_str() };

        let item_type = match get_str("type") {
            Some(s) => ItemType::parse(s).unwrap_or_else(|| {
                warn!(target: "kash.items", item = loc, value = s, "unknown item type, defaulting to doc");
                ItemType::Doc
            }),
            None => ItemType::Doc,
        };
        let state = match get_str("state") {
            Some(s) => State::parse(s).unwrap_or_else(|| {
                warn!(target: "kash.items", item = loc, value = s, "unknown state, defaulting to draft");
                State::default()
            }),
            None => State::default(),
        };
        let format = get_str("format").and_then(|s| {
            let parsed = serde_yaml::from_str::<Format>(&format!("\"{s}\"")).ok();
            if parsed.is_none() {
                warn!(target: "kash.items", item = loc, value = s, "unknown format, leaving unset");
            }
            parsed
        });

        let mut item = Item::new(item_type);
        item.state = state;
        item.format = format;
        item.file_ext = format.and_then(|f| f.file_ext());
        item.title = get_str("title").map(str::to_string);
        item.url = get_str("url").map(str::to_string);
        item.description = get_str("description").map(str::to_string);
        item.thumbnail_url = get_str("thumbnail_url").map(str::to_string);

        if let Some(created) = get_str("created_at").and_then(parse_timestamp) {
            item.created_at = created;
        }
        item.modified_at = get_str("modified_at").and_then(parse_timestamp);

        if let Some(source_value) = metadata.get(&Value::String("source".into())) {
            match serde_yaml::from_value::<Source>(source_value.clone()) {
                Ok(source) => item.source = Some(source),
                Err(e) => {
                    warn!(target: "kash.items", item = loc, error = %e, "unreadable source field, dropping");
                }
            }
        }
        if let Some(relations_value) = metadata.get(&Value::String("relations".into())) {
            match serde_yaml::from_value::<ItemRelations>(relations_value.clone()) {
                Ok(relations) => item.relations = relations,
                Err(e) => {
                    warn!(target: "kash.items", item = loc, error = %e, "unreadable relations field, dropping");
                }
            }
        }
        if let Some(history_value) = metadata.get(&Value::String("history".into())) {
            match serde_yaml::from_value::<Vec<OperationSummary>>(history_value.clone()) {
                Ok(history) => item.history = history,
                Err(e) => {
                    warn!(target: "kash.items", item = loc, error = %e, "unreadable history field, dropping");
                }
            }
        }
        if let Some(Value::Mapping(extra)) = metadata.get(&Value::String("extra".into())) {
            for (k, v) in extra {
                if let Some(key) = k.as_str() {
                    item.extra.insert(key.to_string(), v.clone());
                }
            }
        }

        const KNOWN_KEYS: &[&str] = &[
            "type",
            "state",
            "title",
            "url",
            "description",
            "format",
            "created_at",
            "modified_at",
            "source",
            "relations",
            "history",
            "thumbnail_url",
            "extra",
        ];
        let unexpected: Vec<String> = metadata
            .keys()
            .filter_map(Value::as_str)
            .filter(|k| !KNOWN_KEYS.contains(k))
            .map(str::to_string)
            .collect();
        if !unexpected.is_empty() {
            info!(
                target: "kash.items",
                item = loc,
                fields = ?unexpected,
                "skipping unexpected metadata fields"
            );
        }

        item
    }
}

// ---------------------------------------------------------------------------
// Text helpers
// ---------------------------------------------------------------------------

fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Strip HTML tags, leaving the text content.
#[must_use]
pub fn html_to_plaintext(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate on a char boundary, appending an ellipsis when shortened.
#[must_use]
pub fn abbrev_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let cut: String = s.chars().take(max_len.saturating_sub(1)).collect();
    format!("{}…", cut.trim_end())
}

/// Slugify a title: lowercase, `[a-z0-9_]` only, `_`-separated, capped at
/// `max_len`.
#[must_use]
pub fn slugify(s: &str, max_len: usize) -> String {
    let mut slug = String::with_capacity(s.len());
    let mut last_was_sep = true;
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_was_sep = false;
        } else if c.is_alphanumeric() {
            // Non-ASCII letters and digits are kept, lowercased.
            for lc in c.to_lowercase() {
                slug.push(lc);
            }
            last_was_sep = false;
        } else if !last_was_sep {
            slug.push('_');
            last_was_sep = true;
        }
    }
    let slug = slug.trim_matches('_');
    let truncated: String = slug.chars().take(max_len).collect();
    truncated.trim_end_matches('_').to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
