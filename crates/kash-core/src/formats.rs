// SPDX-License-Identifier: MIT OR Apache-2.0
//! File format and extension taxonomy with content detection.
//!
//! [`Format`] is the closed set of data formats an item body (or resource)
//! can have. [`FileExt`] is the set of recognized file extensions. Detection
//! trusts known extensions first and falls back to content inspection.

use kash_error::{KashError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::path::Path;

// ---------------------------------------------------------------------------
// MediaType
// ---------------------------------------------------------------------------

/// Broad media category, used to decide what processing is possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    /// Processable text.
    Text,
    /// Raster or vector image.
    Image,
    /// Audio media.
    Audio,
    /// Video media.
    Video,
    /// A web page or URL resource.
    Webpage,
    /// Anything else.
    Binary,
}

// ---------------------------------------------------------------------------
// FileExt
// ---------------------------------------------------------------------------

/// Recognized file extensions for store files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum FileExt {
    Txt,
    Md,
    Html,
    Yml,
    Diff,
    Py,
    Sh,
    Xsh,
    Ksh,
    Json,
    Csv,
    Npz,
    Log,
    Pdf,
    Docx,
    Jpg,
    Png,
    Gif,
    Svg,
    Mp3,
    M4a,
    Mp4,
}

impl FileExt {
    /// Parse an extension string, with or without a leading dot.
    /// Common aliases (`markdown`, `htm`, `yaml`, `jpeg`, `text`) map to the
    /// canonical extension.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim_start_matches('.').to_ascii_lowercase();
        let ext = match s.as_str() {
            "txt" | "text" => Self::Txt,
            "md" | "markdown" => Self::Md,
            "html" | "htm" => Self::Html,
            "yml" | "yaml" => Self::Yml,
            "diff" | "patch" => Self::Diff,
            "py" => Self::Py,
            "sh" | "bash" => Self::Sh,
            "xsh" => Self::Xsh,
            "ksh" => Self::Ksh,
            "json" => Self::Json,
            "csv" => Self::Csv,
            "npz" => Self::Npz,
            "log" => Self::Log,
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            "jpg" | "jpeg" => Self::Jpg,
            "png" => Self::Png,
            "gif" => Self::Gif,
            "svg" => Self::Svg,
            "mp3" => Self::Mp3,
            "m4a" => Self::M4a,
            "mp4" => Self::Mp4,
            _ => return None,
        };
        Some(ext)
    }

    /// Canonical extension string, without the dot.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Txt => "txt",
            Self::Md => "md",
            Self::Html => "html",
            Self::Yml => "yml",
            Self::Diff => "diff",
            Self::Py => "py",
            Self::Sh => "sh",
            Self::Xsh => "xsh",
            Self::Ksh => "ksh",
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Npz => "npz",
            Self::Log => "log",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Jpg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Svg => "svg",
            Self::Mp3 => "mp3",
            Self::M4a => "m4a",
            Self::Mp4 => "mp4",
        }
    }

    /// Extension with a leading dot.
    #[must_use]
    pub fn dot_ext(&self) -> String {
        format!(".{}", self.as_str())
    }
}

impl fmt::Display for FileExt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Format
// ---------------------------------------------------------------------------

/// Format of the data in a file or item. For text items this is the body
/// format; for resources it is the format of the resource itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum Format {
    /// A URL resource; content lives in frontmatter, there is no body.
    Url,
    Plaintext,
    Markdown,
    /// Markdown structured with embedded HTML (e.g. div-chunked docs).
    MdHtml,
    Html,
    Yaml,
    Diff,
    Python,
    Shellscript,
    Xonsh,
    Json,
    Csv,
    Npz,
    Log,
    Pdf,
    Docx,
    Jpeg,
    Png,
    Gif,
    Svg,
    Mp3,
    M4a,
    Mp4,
    /// Catch-all for unrecognized binary files.
    Binary,
}

impl Format {
    /// Does this format have a body (vs. content stored in metadata only)?
    #[must_use]
    pub fn has_body(&self) -> bool {
        !matches!(self, Self::Url)
    }

    /// Can this format be read into a string and processed by text tools?
    #[must_use]
    pub fn is_text(&self) -> bool {
        matches!(
            self,
            Self::Plaintext
                | Self::Markdown
                | Self::MdHtml
                | Self::Html
                | Self::Svg
                | Self::Yaml
                | Self::Diff
                | Self::Python
                | Self::Shellscript
                | Self::Xonsh
                | Self::Json
                | Self::Csv
                | Self::Log
        )
    }

    /// A binary format has a body that is not text.
    #[must_use]
    pub fn is_binary(&self) -> bool {
        self.has_body() && !self.is_text()
    }

    /// Document-like formats.
    #[must_use]
    pub fn is_doc(&self) -> bool {
        matches!(
            self,
            Self::Markdown | Self::MdHtml | Self::Html | Self::Pdf | Self::Docx
        )
    }

    /// Image formats.
    #[must_use]
    pub fn is_image(&self) -> bool {
        matches!(self, Self::Jpeg | Self::Png | Self::Gif | Self::Svg)
    }

    /// Audio formats.
    #[must_use]
    pub fn is_audio(&self) -> bool {
        matches!(self, Self::Mp3 | Self::M4a)
    }

    /// Video formats.
    #[must_use]
    pub fn is_video(&self) -> bool {
        matches!(self, Self::Mp4)
    }

    /// Is this format compatible with YAML frontmatter metadata?
    #[must_use]
    pub fn supports_frontmatter(&self) -> bool {
        matches!(
            self,
            Self::Url
                | Self::Plaintext
                | Self::Markdown
                | Self::MdHtml
                | Self::Html
                | Self::Yaml
                | Self::Diff
                | Self::Python
                | Self::Shellscript
                | Self::Xonsh
                | Self::Csv
                | Self::Log
        )
    }

    /// Broad media category for this format.
    #[must_use]
    pub fn media_type(&self) -> MediaType {
        match self {
            Self::Url | Self::Html => MediaType::Webpage,
            Self::Plaintext
            | Self::Markdown
            | Self::MdHtml
            | Self::Yaml
            | Self::Diff
            | Self::Python
            | Self::Shellscript
            | Self::Xonsh
            | Self::Json
            | Self::Csv
            | Self::Log
            | Self::Pdf
            | Self::Docx => MediaType::Text,
            Self::Jpeg | Self::Png | Self::Gif | Self::Svg => MediaType::Image,
            Self::Mp3 | Self::M4a => MediaType::Audio,
            Self::Mp4 => MediaType::Video,
            Self::Npz | Self::Binary => MediaType::Binary,
        }
    }

    /// The file extension to use for this format, when unambiguous.
    /// URL resources are saved as YAML files.
    #[must_use]
    pub fn file_ext(&self) -> Option<FileExt> {
        let ext = match self {
            Self::Url => FileExt::Yml,
            Self::Plaintext => FileExt::Txt,
            Self::Markdown | Self::MdHtml => FileExt::Md,
            Self::Html => FileExt::Html,
            Self::Yaml => FileExt::Yml,
            Self::Diff => FileExt::Diff,
            Self::Python => FileExt::Py,
            Self::Shellscript => FileExt::Sh,
            Self::Xonsh => FileExt::Xsh,
            Self::Json => FileExt::Json,
            Self::Csv => FileExt::Csv,
            Self::Npz => FileExt::Npz,
            Self::Log => FileExt::Log,
            Self::Pdf => FileExt::Pdf,
            Self::Docx => FileExt::Docx,
            Self::Jpeg => FileExt::Jpg,
            Self::Png => FileExt::Png,
            Self::Gif => FileExt::Gif,
            Self::Svg => FileExt::Svg,
            Self::Mp3 => FileExt::Mp3,
            Self::M4a => FileExt::M4a,
            Self::Mp4 => FileExt::Mp4,
            Self::Binary => return None,
        };
        Some(ext)
    }

    /// Guess the format for a file extension, when the extension determines
    /// it. `md` maps to plain Markdown, not `md_html`.
    #[must_use]
    pub fn guess_by_file_ext(file_ext: FileExt) -> Option<Self> {
        let format = match file_ext {
            FileExt::Txt => Self::Plaintext,
            FileExt::Md => Self::Markdown,
            FileExt::Html => Self::Html,
            FileExt::Yml => Self::Yaml,
            FileExt::Diff => Self::Diff,
            FileExt::Py => Self::Python,
            FileExt::Sh => Self::Shellscript,
            FileExt::Xsh => Self::Xonsh,
            FileExt::Json => Self::Json,
            FileExt::Csv => Self::Csv,
            FileExt::Npz => Self::Npz,
            FileExt::Log => Self::Log,
            FileExt::Pdf => Self::Pdf,
            FileExt::Docx => Self::Docx,
            FileExt::Jpg => Self::Jpeg,
            FileExt::Png => Self::Png,
            FileExt::Gif => Self::Gif,
            FileExt::Svg => Self::Svg,
            FileExt::Mp3 => Self::Mp3,
            FileExt::M4a => Self::M4a,
            FileExt::Mp4 => Self::Mp4,
            FileExt::Ksh => return None,
        };
        Some(format)
    }

    /// MIME type for the format, when one applies.
    #[must_use]
    pub fn mime_type(&self) -> Option<&'static str> {
        let mime = match self {
            Self::Url | Self::Binary => return None,
            Self::Plaintext => "text/plain",
            Self::Markdown | Self::MdHtml => "text/markdown",
            Self::Html => "text/html",
            Self::Yaml => "application/yaml",
            Self::Diff => "text/x-diff",
            Self::Python => "text/x-python",
            Self::Shellscript => "text/x-shellscript",
            Self::Xonsh => "text/x-xonsh",
            Self::Json => "application/json",
            Self::Csv => "text/csv",
            Self::Npz => "application/x-npz",
            Self::Log => "text/plain",
            Self::Pdf => "application/pdf",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Svg => "image/svg+xml",
            Self::Mp3 => "audio/mpeg",
            Self::M4a => "audio/mp4",
            Self::Mp4 => "video/mp4",
        };
        Some(mime)
    }
}

impl Format {
    /// Stable snake_case name, matching the serde form.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Url => "url",
            Self::Plaintext => "plaintext",
            Self::Markdown => "markdown",
            Self::MdHtml => "md_html",
            Self::Html => "html",
            Self::Yaml => "yaml",
            Self::Diff => "diff",
            Self::Python => "python",
            Self::Shellscript => "shellscript",
            Self::Xonsh => "xonsh",
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Npz => "npz",
            Self::Log => "log",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Svg => "svg",
            Self::Mp3 => "mp3",
            Self::M4a => "m4a",
            Self::Mp4 => "mp4",
            Self::Binary => "binary",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// How many bytes of content to inspect when sniffing a file.
const SNIFF_LEN: usize = 8 * 1024;

/// Detect the format of a file: trust a recognized extension first,
/// otherwise inspect the content.
///
/// # Errors
///
/// Returns an error only if the file cannot be read.
pub fn detect_file_format(path: &Path) -> Result<Option<Format>> {
    if let Some(ext) = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(FileExt::parse)
    {
        if let Some(format) = Format::guess_by_file_ext(ext) {
            return Ok(Some(format));
        }
    }

    let mut file = std::fs::File::open(path)
        .map_err(|e| KashError::io(format!("open {}", path.display()), e))?;
    let mut buf = vec![0u8; SNIFF_LEN];
    let n = file
        .read(&mut buf)
        .map_err(|e| KashError::io(format!("read {}", path.display()), e))?;
    buf.truncate(n);

    Ok(detect_format_from_bytes(&buf))
}

/// Detect a format from raw content bytes: magic numbers first, then the
/// HTML / multi-part YAML / Markdown heuristics, then plaintext.
#[must_use]
pub fn detect_format_from_bytes(bytes: &[u8]) -> Option<Format> {
    if bytes.is_empty() {
        return Some(Format::Plaintext);
    }

    if let Some(f) = sniff_magic(bytes) {
        return Some(f);
    }

    let Ok(text) = std::str::from_utf8(bytes) else {
        return Some(Format::Binary);
    };

    if looks_like_html(text) {
        Some(Format::Html)
    } else if looks_like_multipart_yaml(text) {
        Some(Format::Yaml)
    } else if looks_like_markdown(text) {
        Some(Format::Markdown)
    } else {
        Some(Format::Plaintext)
    }
}

fn sniff_magic(bytes: &[u8]) -> Option<Format> {
    const MAGIC: &[(&[u8], Format)] = &[
        (b"%PDF-", Format::Pdf),
        (b"\x89PNG\r\n\x1a\n", Format::Png),
        (b"\xFF\xD8\xFF", Format::Jpeg),
        (b"GIF87a", Format::Gif),
        (b"GIF89a", Format::Gif),
        (b"ID3", Format::Mp3),
    ];
    for (prefix, format) in MAGIC {
        if bytes.starts_with(prefix) {
            return Some(*format);
        }
    }
    // MP4 containers carry "ftyp" at offset 4.
    if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
        return Some(Format::Mp4);
    }
    None
}

fn looks_like_html(text: &str) -> bool {
    let head: String = text.trim_start().chars().take(64).collect();
    let head = head.to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

/// Two or more `---`-fenced documents each starting with a `key:` line.
fn looks_like_multipart_yaml(text: &str) -> bool {
    let mut matches = 0;
    let mut lines = text.lines().peekable();
    while let Some(line) = lines.next() {
        if line.trim_end() == "---" {
            if let Some(next) = lines.peek() {
                let mut chars = next.chars();
                let starts_word = chars.next().is_some_and(|c| c.is_alphanumeric() || c == '_');
                if starts_word && next.contains(':') {
                    matches += 1;
                }
            }
        }
    }
    matches >= 2
}

/// Markdown heuristic: mostly prose plus a few formatting markers.
fn looks_like_markdown(text: &str) -> bool {
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() {
        return false;
    }

    let marker_lines = lines
        .iter()
        .filter(|l| {
            let t = l.trim_start();
            t.starts_with("# ")
                || t.starts_with("## ")
                || t.starts_with("- ")
                || t.starts_with("* ")
                || t.starts_with("> ")
                || t.contains("](")
                || t.contains("**")
        })
        .count();

    let prose_chars = text
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .count();
    let prose_ratio = prose_chars as f64 / text.len() as f64;

    marker_lines >= 2 && prose_ratio > 0.6
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
