// SPDX-License-Identifier: MIT OR Apache-2.0
//! kash-web
//!
//! The web-fetch contract the engine consumes, plus a default HTTP
//! implementation.
//!
//! The pipeline needs exactly two operations from the web: fetch a page as
//! text (to fill in titles and descriptions on imported URL resources) and
//! download a URL to a file (for the content cache). Both live on the
//! [`WebFetcher`] trait so tests and embedders can substitute their own
//! transport.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use kash_core::items::{html_to_plaintext, Item};
use kash_error::{KashError, Result};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Request timeout for page fetches and downloads.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// Metadata extracted from a fetched web page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMetadata {
    /// Page title.
    pub title: Option<String>,
    /// Meta description.
    pub description: Option<String>,
    /// Social-preview image URL, if declared.
    pub thumbnail_url: Option<String>,
}

/// The web operations the engine consumes.
pub trait WebFetcher: Send + Sync {
    /// Fetch a URL and return its body as text.
    ///
    /// # Errors
    ///
    /// Returns an error for transport failures or non-success statuses.
    fn fetch_text(&self, url: &str) -> Result<String>;

    /// Download a URL into a destination file.
    ///
    /// # Errors
    ///
    /// Returns an error for transport failures or write failures.
    fn download(&self, url: &str, dest: &Path) -> Result<()>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// Default [`WebFetcher`] backed by a blocking HTTP client.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    /// Create a fetcher using the given user agent.
    ///
    /// # Errors
    ///
    /// Returns a [`KashError::SetupError`] if the HTTP client cannot be
    /// constructed.
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| KashError::SetupError(format!("could not build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Create a fetcher with the user agent from settings.
    ///
    /// # Errors
    ///
    /// Returns a [`KashError::SetupError`] if the HTTP client cannot be
    /// constructed.
    pub fn from_settings(settings: &kash_config::KashSettings) -> Result<Self> {
        Self::new(&settings.user_agent)
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| KashError::ApiResultError(format!("fetch {url}: {e}")))?;
        if !response.status().is_success() {
            return Err(KashError::ApiResultError(format!(
                "fetch {url}: HTTP {}",
                response.status()
            )));
        }
        Ok(response)
    }
}

impl WebFetcher for HttpFetcher {
    fn fetch_text(&self, url: &str) -> Result<String> {
        debug!(target: "kash.web", url, "fetching page");
        self.get(url)?
            .text()
            .map_err(|e| KashError::ApiResultError(format!("read body of {url}: {e}")))
    }

    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        info!(target: "kash.web", url, dest = %dest.display(), "downloading");
        let bytes = self
            .get(url)?
            .bytes()
            .map_err(|e| KashError::ApiResultError(format!("read body of {url}: {e}")))?;
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| KashError::io(format!("create dir {}", parent.display()), e))?;
        }
        std::fs::write(dest, &bytes)
            .map_err(|e| KashError::io(format!("write {}", dest.display()), e))
    }
}

impl kash_cache::UrlFetcher for HttpFetcher {
    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        WebFetcher::download(self, url, dest)
    }
}

// ---------------------------------------------------------------------------
// Page metadata extraction
// ---------------------------------------------------------------------------

/// Pull the value of an attribute out of a tag snippet.
fn attr_value(tag: &str, attr: &str) -> Option<String> {
    let start = tag.find(&format!("{attr}="))? + attr.len() + 1;
    let rest = &tag[start..];
    let quote = rest.chars().next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let rest = &rest[1..];
    let end = rest.find(quote)?;
    Some(rest[..end].to_string())
}

fn find_meta_content(html_lower: &str, html: &str, marker: &str) -> Option<String> {
    let pos = html_lower.find(marker)?;
    let tag_start = html_lower[..pos].rfind('<')?;
    let tag_end = html_lower[pos..].find('>')? + pos;
    let tag = &html[tag_start..=tag_end];
    attr_value(tag, "content").filter(|v| !v.trim().is_empty())
}

/// Extract title, description, and thumbnail from an HTML page.
#[must_use]
pub fn extract_page_metadata(html: &str) -> PageMetadata {
    let html_lower = html.to_lowercase();
    // Slicing uses byte offsets from the lowercased copy; fall back to it
    // entirely when lowercasing changed byte lengths.
    let source = if html.len() == html_lower.len() {
        html
    } else {
        html_lower.as_str()
    };

    let title = html_lower.find("<title").and_then(|start| {
        let open_end = html_lower[start..].find('>')? + start + 1;
        let close = html_lower[open_end..].find("</title>")? + open_end;
        let raw = html_to_plaintext(&source[open_end..close]);
        let cleaned = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        (!cleaned.is_empty()).then_some(cleaned)
    });

    let description = find_meta_content(&html_lower, source, "name=\"description\"")
        .or_else(|| find_meta_content(&html_lower, source, "property=\"og:description\""));

    let thumbnail_url = find_meta_content(&html_lower, source, "property=\"og:image\"")
        .or_else(|| find_meta_content(&html_lower, source, "name=\"twitter:image\""));

    PageMetadata {
        title,
        description,
        thumbnail_url,
    }
}

/// Fill in missing title/description/thumbnail on a URL resource item by
/// fetching the page. Fetch failures are logged and leave the item
/// unchanged (metadata is best-effort).
#[must_use]
pub fn fetch_url_item_metadata(fetcher: &dyn WebFetcher, mut item: Item) -> Item {
    let Some(url) = item.url.clone() else {
        return item;
    };
    if item.title.is_some() && item.description.is_some() {
        return item;
    }

    match fetcher.fetch_text(&url) {
        Ok(html) => {
            let metadata = extract_page_metadata(&html);
            if item.title.is_none() {
                item.title = metadata.title;
            }
            if item.description.is_none() {
                item.description = metadata.description;
            }
            if item.thumbnail_url.is_none() {
                item.thumbnail_url = metadata.thumbnail_url;
            }
            info!(
                target: "kash.web",
                url,
                title = item.title.as_deref().unwrap_or(""),
                "fetched URL metadata"
            );
        }
        Err(e) => {
            warn!(target: "kash.web", url, error = %e, "could not fetch URL metadata");
        }
    }
    item
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
