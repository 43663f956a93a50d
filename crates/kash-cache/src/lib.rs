// SPDX-License-Identifier: MIT OR Apache-2.0
//! kash-cache
//!
//! Content-addressed local file cache.
//!
//! A [`ContentCache`] is a [`DirStore`] with a loading and caching mechanism
//! based on a fixed expiration interval. The fetch timestamp is the
//! modification time on the cached file. File creation is atomic
//! (temp-then-rename), so the cache is safe for concurrent readers and
//! writers on the same key.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use kash_core::formats::FileExt;
use kash_core::items::slugify;
use kash_core::urls::{is_url, normalize_url};
use kash_error::{KashError, Result};
use sha1::{Digest, Sha1};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info};

/// Expiration value meaning "cached entries never expire".
pub const NEVER: f64 = -1.0;
/// Expiration value meaning "always refetch".
pub const ALWAYS: f64 = 0.0;

/// Folder under the cache root for original fetched content.
const ORIGINALS_FOLDER: &str = "originals";

/// Length of the hashed subdirectory prefix.
const HASH_SUBDIR_LEN: usize = 8;

/// Maximum slug length for cache filenames.
const CACHE_SLUG_LEN: usize = 60;

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// An item that can be loaded or computed, then cached to a file.
pub struct Loadable {
    /// Unique identifier. When it ends in a recognized file extension, the
    /// extension carries over to the cache filename.
    pub key: String,
    /// Saves the item to the given path. The cache handles path selection
    /// and atomicity.
    pub save: Box<dyn Fn(&Path) -> Result<()> + Send + Sync>,
}

impl Loadable {
    /// Create a loadable from a key and save function.
    pub fn new(
        key: impl Into<String>,
        save: impl Fn(&Path) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            key: key.into(),
            save: Box::new(save),
        }
    }
}

impl std::fmt::Debug for Loadable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loadable").field("key", &self.key).finish()
    }
}

/// Anything that can be cached as a file.
#[derive(Debug)]
pub enum CacheSource {
    /// A web URL (requires a [`UrlFetcher`]).
    Url(String),
    /// A local file to copy in.
    Path(PathBuf),
    /// An arbitrary loadable value.
    Loadable(Loadable),
}

impl CacheSource {
    /// Parse a locator string into a URL or path source.
    #[must_use]
    pub fn from_locator(locator: &str) -> Self {
        if is_url(locator) {
            Self::Url(locator.to_string())
        } else {
            Self::Path(PathBuf::from(locator))
        }
    }

    fn key(&self) -> String {
        match self {
            Self::Url(url) => normalize_url(url),
            Self::Path(path) => path.display().to_string(),
            Self::Loadable(loadable) => loadable.key.clone(),
        }
    }

    fn suffix(&self) -> Option<String> {
        let key = self.key();
        let ext = key.rsplit('.').next()?;
        FileExt::parse(ext).map(|e| e.dot_ext())
    }
}

/// Downloads a URL to a destination file. Implemented by the web layer;
/// injected so the cache itself stays transport-free.
pub trait UrlFetcher: Send + Sync {
    /// Download `url` into `dest`, creating parent directories as needed.
    fn download(&self, url: &str, dest: &Path) -> Result<()>;
}

// ---------------------------------------------------------------------------
// DirStore
// ---------------------------------------------------------------------------

/// Maps arbitrary string keys to stable file paths under a root directory.
///
/// Paths look like `{root}/{folder}/{hashed_subdir}/{slug}{suffix}`: the
/// hashed subdirectory keeps collisions apart while the slug keeps paths
/// readable.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    /// Create a store rooted at `root` (created lazily on write).
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The store's root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The stable path for a key.
    #[must_use]
    pub fn path_for(&self, key: &str, folder: &str, suffix: Option<&str>) -> PathBuf {
        let digest = Sha1::digest(key.as_bytes());
        let hex = format!("{digest:x}");
        let subdir = &hex[..HASH_SUBDIR_LEN];

        let tail = key.rsplit('/').next().unwrap_or(key);
        let mut name = slugify(tail, CACHE_SLUG_LEN);
        if name.is_empty() {
            name = hex[HASH_SUBDIR_LEN..HASH_SUBDIR_LEN + 8].to_string();
        }
        if let Some(suffix) = suffix {
            // Avoid doubling the extension when the slug already carries it.
            let bare_suffix = suffix.trim_start_matches('.');
            if name.ends_with(&format!("_{bare_suffix}")) {
                name.truncate(name.len() - bare_suffix.len() - 1);
            }
            name.push_str(suffix);
        }

        self.root.join(folder).join(subdir).join(name)
    }

    /// The path for a key, if a file exists there.
    #[must_use]
    pub fn find(&self, key: &str, folder: &str, suffix: Option<&str>) -> Option<PathBuf> {
        let path = self.path_for(key, folder, suffix);
        path.exists().then_some(path)
    }
}

// ---------------------------------------------------------------------------
// ContentCache
// ---------------------------------------------------------------------------

fn read_mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Copy `src` to `dest` atomically (temp-then-rename in the dest dir).
fn copy_atomic(src: &Path, dest: &Path) -> Result<()> {
    write_atomic(dest, |tmp| {
        fs::copy(src, tmp)
            .map_err(|e| KashError::io(format!("copy {} -> {}", src.display(), tmp.display()), e))?;
        Ok(())
    })
}

/// Run `write` against a temp file next to `dest`, then rename into place.
fn write_atomic(dest: &Path, write: impl FnOnce(&Path) -> Result<()>) -> Result<()> {
    let parent = dest
        .parent()
        .ok_or_else(|| KashError::InvalidInput(format!("no parent dir: {}", dest.display())))?;
    fs::create_dir_all(parent)
        .map_err(|e| KashError::io(format!("create dir {}", parent.display()), e))?;

    let tmp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| KashError::io(format!("create temp file in {}", parent.display()), e))?;
    write(tmp.path())?;
    tmp.persist(dest)
        .map_err(|e| KashError::io(format!("rename into {}", dest.display()), e.error))?;
    Ok(())
}

/// Content cache with expiration.
pub struct ContentCache {
    store: DirStore,
    default_expiration_secs: f64,
    fetcher: Option<Arc<dyn UrlFetcher>>,
}

impl ContentCache {
    /// Create a cache at `root`. `default_expiration_secs` may be
    /// [`NEVER`], [`ALWAYS`], or a positive number of seconds.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, default_expiration_secs: f64) -> Self {
        Self {
            store: DirStore::new(root),
            default_expiration_secs,
            fetcher: None,
        }
    }

    /// Attach a URL fetcher so [`CacheSource::Url`] sources work.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn UrlFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// The cache's root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.store.root()
    }

    fn is_expired(&self, path: &Path, expiration_secs: Option<f64>) -> bool {
        let expiration = expiration_secs.unwrap_or(self.default_expiration_secs);
        if expiration == ALWAYS {
            return true;
        }
        if expiration == NEVER {
            return false;
        }
        match read_mtime(path) {
            Some(mtime) => {
                let age = SystemTime::now()
                    .duration_since(mtime)
                    .unwrap_or(Duration::ZERO);
                age.as_secs_f64() > expiration
            }
            None => true,
        }
    }

    /// Whether the source is present and unexpired.
    #[must_use]
    pub fn is_cached(&self, source: &CacheSource, expiration_secs: Option<f64>) -> bool {
        let key = source.key();
        self.store
            .find(&key, ORIGINALS_FOLDER, source.suffix().as_deref())
            .is_some_and(|path| !self.is_expired(&path, expiration_secs))
    }

    /// Return the cached path for the source, fetching/loading it if absent
    /// or expired. The boolean is true when the entry was already cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be loaded (missing file, no
    /// fetcher for URLs, loader failure).
    pub fn cache(
        &self,
        source: &CacheSource,
        expiration_secs: Option<f64>,
    ) -> Result<(PathBuf, bool)> {
        let key = source.key();
        let suffix = source.suffix();
        let cache_path = self.store.path_for(&key, ORIGINALS_FOLDER, suffix.as_deref());

        if cache_path.exists() && !self.is_expired(&cache_path, expiration_secs) {
            debug!(target: "kash.cache", key, path = %cache_path.display(), "cache hit");
            return Ok((cache_path, true));
        }

        info!(target: "kash.cache", key, "caching new copy");
        self.load_source(source, &cache_path)?;
        Ok((cache_path, false))
    }

    fn load_source(&self, source: &CacheSource, cache_path: &Path) -> Result<()> {
        match source {
            CacheSource::Path(path) => {
                if !path.exists() {
                    return Err(KashError::FileNotFound(path.display().to_string()));
                }
                copy_atomic(path, cache_path)
            }
            CacheSource::Url(url) => {
                let fetcher = self.fetcher.as_ref().ok_or_else(|| {
                    KashError::SetupError("no URL fetcher attached to content cache".into())
                })?;
                let url = normalize_url(url);
                write_atomic(cache_path, |tmp| fetcher.download(&url, tmp))
            }
            CacheSource::Loadable(loadable) => {
                write_atomic(cache_path, |tmp| (loadable.save)(tmp))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
