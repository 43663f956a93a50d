// SPDX-License-Identifier: MIT OR Apache-2.0
//! The workspace file store.
//!
//! A [`FileStore`] manages the files in one workspace: choosing unique
//! store paths, saving/loading items, maintaining the item-id index for
//! rerun avoidance, archiving, and the selection history.
//!
//! All mutable in-memory state (uniquifier, id index, selections, params)
//! lives behind one lock, and `save` holds it across its whole
//! archive-write-compare sequence, so concurrent saves of items with the
//! same target path serialize. File writes themselves are atomic
//! (temp-then-rename), so loads and hashes run without the lock.

use crate::filenames::{folder_for_type, join_suffix, parse_item_filename};
use crate::frontmatter::{read_item, sidecar_path, write_item, write_sidecar_meta};
use crate::ignore::{add_to_ignore_file, IgnoreChecker};
use crate::params_state::ParamState;
use crate::selections::{Selection, SelectionHistory, DEFAULT_MAX_HISTORY};
use crate::uniquifier::Uniquifier;
use crate::workspace::{MetadataDirs, ARCHIVE_DIR};
use kash_core::items::{Item, ItemId, ItemType, SLUG_MAX_LEN};
use kash_core::paths::StorePath;
use kash_core::urls::{canonicalize_url, is_url};
use kash_error::{KashError, Result};
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Options for [`FileStore::save`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SaveOptions {
    /// Overwrite the default path instead of uniquifying.
    pub overwrite: bool,
    /// Save under the temporary directory inside the store metadata dir.
    pub as_tmp: bool,
    /// Skip body normalization.
    pub no_format: bool,
    /// Write the raw file without frontmatter.
    pub no_frontmatter: bool,
}

/// In-memory indices and persisted state, all behind the store lock.
struct StoreState {
    uniquifier: Uniquifier,
    id_map: HashMap<ItemId, StorePath>,
    selections: SelectionHistory,
    params: ParamState,
    warnings: Vec<String>,
}

/// The file store for one workspace.
pub struct FileStore {
    base_dir: PathBuf,
    name: String,
    is_global_ws: bool,
    dirs: MetadataDirs,
    ignore: IgnoreChecker,
    state: Mutex<StoreState>,
}

fn lock_state<'a>(mutex: &'a Mutex<StoreState>) -> MutexGuard<'a, StoreState> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl FileStore {
    /// Open (and with `auto_init`, initialize) the workspace at `base_dir`.
    ///
    /// Loading walks the store to build the slug uniquifier and the item-id
    /// index, then prunes dead paths from the selection history.
    ///
    /// # Errors
    ///
    /// Returns [`KashError::FileNotFound`] when the directory is not an
    /// initialized workspace and `auto_init` is false, or an I/O error if
    /// initialization fails.
    pub fn open(base_dir: &Path, auto_init: bool) -> Result<Self> {
        let base_dir = if base_dir.is_absolute() {
            base_dir.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| KashError::io("resolve current dir", e))?
                .join(base_dir)
        };

        let dirs = MetadataDirs::new(base_dir.clone());
        if !dirs.is_initialized() {
            if !auto_init {
                return Err(KashError::FileNotFound(format!(
                    "directory is not a workspace: {}",
                    base_dir.display()
                )));
            }
            fs::create_dir_all(&base_dir)
                .map_err(|e| KashError::io(format!("create {}", base_dir.display()), e))?;
            dirs.initialize()?;
        }

        add_to_ignore_file(&base_dir.join(".gitignore"), &[".kash/"]);

        let ignore = IgnoreChecker::from_file(&dirs.ignore_file())?;
        let name = base_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workspace".to_string());
        let is_global_ws = name.eq_ignore_ascii_case(kash_config::GLOBAL_WS_NAME);

        let store = Self {
            base_dir,
            name,
            is_global_ws,
            ignore,
            state: Mutex::new(StoreState {
                uniquifier: Uniquifier::new(),
                id_map: HashMap::new(),
                selections: SelectionHistory::init(dirs.selections_yml(), DEFAULT_MAX_HISTORY),
                params: ParamState::init(dirs.params_yml()),
                warnings: Vec::new(),
            }),
            dirs,
        };

        store.rebuild_index()?;
        store.refresh_selections();
        Ok(store)
    }

    /// The workspace root directory.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// The workspace name (its directory name).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is the global fallback workspace.
    #[must_use]
    pub fn is_global_ws(&self) -> bool {
        self.is_global_ws
    }

    /// The metadata layout for this workspace.
    #[must_use]
    pub fn dirs(&self) -> &MetadataDirs {
        &self.dirs
    }

    /// Warnings accumulated while loading (duplicates etc.).
    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        lock_state(&self.state).warnings.clone()
    }

    // -- Paths -----------------------------------------------------------

    /// Absolute path for a store path.
    #[must_use]
    pub fn abs_path(&self, store_path: &StorePath) -> PathBuf {
        self.base_dir.join(store_path.as_path())
    }

    /// Whether the store path refers to an existing file.
    #[must_use]
    pub fn exists(&self, store_path: &StorePath) -> bool {
        self.abs_path(store_path).exists()
    }

    /// Resolve a filesystem path to a store path, when it lies inside the
    /// workspace.
    #[must_use]
    pub fn resolve_to_store_path(&self, path: &Path) -> Option<StorePath> {
        let abs = if path.is_absolute() {
            path.to_path_buf()
        } else {
            return StorePath::from_rel_path(path).ok();
        };
        let rel = abs.strip_prefix(&self.base_dir).ok()?;
        StorePath::from_rel_path(rel).ok()
    }

    fn is_in_store(&self, path: &Path) -> bool {
        path.starts_with(&self.base_dir) && !path.starts_with(self.dirs.dot_dir())
    }

    // -- Load and hash ---------------------------------------------------

    /// Load the item at the given store path.
    ///
    /// # Errors
    ///
    /// Returns [`KashError::FileNotFound`] for missing files and
    /// [`KashError::SkippableError`] for files that cannot be parsed as
    /// items.
    pub fn load(&self, store_path: &StorePath) -> Result<Item> {
        let path = self.abs_path(store_path);
        if !path.exists() {
            return Err(KashError::FileNotFound(store_path.to_string()));
        }
        read_item(&path, &self.base_dir)
    }

    /// Content hash of the file at the given path: `sha1:{hex}` over the
    /// raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn hash(&self, store_path: &StorePath) -> Result<String> {
        let path = self.abs_path(store_path);
        let bytes =
            fs::read(&path).map_err(|e| KashError::io(format!("read {}", path.display()), e))?;
        let digest = Sha1::digest(&bytes);
        Ok(format!("sha1:{digest:x}"))
    }

    // -- Path selection --------------------------------------------------

    /// The default (non-uniquified) store path for an item.
    ///
    /// # Errors
    ///
    /// Returns an error when no file extension can be determined.
    pub fn default_path_for(&self, item: &Item) -> Result<StorePath> {
        let folder = folder_for_type(item.item_type);
        let filename = join_suffix(&item.slug_name(SLUG_MAX_LEN), &item.full_suffix()?);
        StorePath::from_rel_path(folder.join(filename))
    }

    /// Choose the store path for an item, returning also the path of the
    /// previous similarly named item (for diff-and-skip), if any.
    ///
    /// # Errors
    ///
    /// Returns an error when no filename can be derived.
    pub fn store_path_for(
        &self,
        item: &Item,
        options: SaveOptions,
    ) -> Result<(StorePath, Option<StorePath>)> {
        let mut state = lock_state(&self.state);
        self.store_path_for_locked(&mut state, item, options)
    }

    fn store_path_for_locked(
        &self,
        state: &mut StoreState,
        item: &Item,
        options: SaveOptions,
    ) -> Result<(StorePath, Option<StorePath>)> {
        if options.as_tmp {
            let default = self.default_path_for(item)?;
            let tmp_rel = Path::new(crate::workspace::DOT_DIR)
                .join("tmp")
                .join(default.as_path());
            return Ok((StorePath::from_rel_path(tmp_rel)?, None));
        }

        if let Some(sp) = &item.store_path {
            return Ok((sp.clone(), None));
        }

        if let Some(id) = item.item_id() {
            if let Some(sp) = state.id_map.get(&id) {
                if self.exists(sp) {
                    debug!(
                        target: "kash.store",
                        id = %id,
                        path = %sp,
                        "reusing store path for existing item id"
                    );
                    return Ok((sp.clone(), None));
                }
            }
        }

        let folder = folder_for_type(item.item_type);
        let slug = item.slug_name(SLUG_MAX_LEN);
        let full_suffix = item.full_suffix()?;

        if options.overwrite {
            let filename = join_suffix(&slug, &full_suffix);
            return Ok((StorePath::from_rel_path(folder.join(filename))?, None));
        }

        let (unique_slug, old_slugs) = state.uniquifier.uniquify_historic(&slug, &full_suffix);
        let filename = join_suffix(&unique_slug, &full_suffix);
        let store_path = StorePath::from_rel_path(folder.join(&filename))?;

        let old_store_path = old_slugs.first().and_then(|old_slug| {
            let old_path = folder.join(join_suffix(old_slug, &full_suffix));
            let sp = StorePath::from_rel_path(old_path).ok()?;
            self.exists(&sp).then_some(sp)
        });

        Ok((store_path, old_store_path))
    }

    // -- Identity index --------------------------------------------------

    /// Best effort to find an item with the same identity in the store.
    #[must_use]
    pub fn find_by_id(&self, item: &Item) -> Option<StorePath> {
        let id = item.item_id()?;
        let mut state = lock_state(&self.state);

        if let Some(sp) = state.id_map.get(&id) {
            if self.exists(sp) {
                return Some(sp.clone());
            }
        }

        // The in-memory map may be incomplete; check the default path too.
        let default = self.default_path_for(item).ok()?;
        if self.exists(&default) {
            if let Ok(existing) = self.load(&default) {
                if existing.item_id() == Some(id.clone()) {
                    state.id_map.insert(id, default.clone());
                    return Some(default);
                }
            }
        }
        None
    }

    /// Rebuild the uniquifier and id index by walking the store.
    ///
    /// # Errors
    ///
    /// Returns an error only if the walk itself fails; unreadable items are
    /// logged and skipped.
    pub fn rebuild_index(&self) -> Result<()> {
        let paths = self.walk_items(None)?;
        let mut state = lock_state(&self.state);
        state.uniquifier = Uniquifier::new();
        state.id_map = HashMap::new();

        let mut num_dups = 0usize;
        for sp in paths {
            if self.index_item_locked(&mut state, &sp).is_some() {
                num_dups += 1;
            }
        }
        if num_dups > 0 {
            let warning = format!("found {num_dups} duplicate items in store; see logs");
            warn!(target: "kash.store", "{warning}");
            state.warnings.push(warning);
        }
        Ok(())
    }

    /// Index one item; returns the previous path when a duplicate identity
    /// is found (the caller decides what to do about it).
    fn index_item_locked(&self, state: &mut StoreState, sp: &StorePath) -> Option<StorePath> {
        let parsed = match parse_item_filename(sp.as_path()) {
            Ok(parsed) => parsed,
            Err(_) => {
                debug!(target: "kash.store", path = %sp, "skipping unrecognized filename");
                return None;
            }
        };
        state.uniquifier.add(&parsed.name, &parsed.full_suffix());

        match self.load(sp) {
            Ok(item) => {
                let id = item.item_id()?;
                let dup = state
                    .id_map
                    .get(&id)
                    .filter(|old| *old != sp && self.exists(old))
                    .cloned();
                if let Some(ref old) = dup {
                    info!(
                        target: "kash.store",
                        id = %id,
                        old = %old,
                        new = %sp,
                        "duplicate items with same id"
                    );
                }
                state.id_map.insert(id, sp.clone());
                dup
            }
            Err(e) if e.is_skippable() => {
                debug!(target: "kash.store", path = %sp, error = %e, "skipping unparseable file");
                None
            }
            Err(e) => {
                warn!(target: "kash.store", path = %sp, error = %e, "could not load item for index");
                None
            }
        }
    }

    fn unindex_item_locked(&self, state: &mut StoreState, item_id: Option<ItemId>, sp: &StorePath) {
        if let Some(id) = item_id {
            if state.id_map.get(&id) == Some(sp) {
                state.id_map.remove(&id);
            }
        }
    }

    // -- Save ------------------------------------------------------------

    /// Save an item, updating its `store_path`.
    ///
    /// The whole sequence (path selection, archive of any previous file,
    /// atomic write, content comparison against the prior version) runs
    /// under the store lock.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid items or I/O failures.
    pub fn save(&self, item: &mut Item, options: SaveOptions) -> Result<StorePath> {
        if options.overwrite && options.as_tmp {
            return Err(KashError::InvalidInput(
                "cannot both overwrite and save to a temporary file".into(),
            ));
        }

        let mut state = lock_state(&self.state);

        // An external file already inside the workspace was saved directly
        // by the action; just record it.
        if let Some(external) = item.external_path.clone() {
            let abs = if external.is_absolute() {
                external.clone()
            } else {
                self.base_dir.join(&external)
            };
            if self.is_in_store(&abs) {
                if let Ok(rel) = abs.strip_prefix(&self.base_dir) {
                    let sp = StorePath::from_rel_path(rel)?;
                    info!(target: "kash.store", path = %sp, "item already saved via external path");
                    item.store_path = Some(sp.clone());
                    self.index_saved_item_locked(&mut state, item, &sp);
                    return Ok(sp);
                }
            }
        }

        item.validate()?;
        if item.file_ext.is_none() {
            item.file_ext = item.format.and_then(|f| f.file_ext());
        }

        let (store_path, old_store_path) =
            self.store_path_for_locked(&mut state, item, options)?;
        let full_path = self.abs_path(&store_path);

        // Archive any existing file at the target so it lands in the
        // archive rather than being lost.
        if full_path.exists() && !options.as_tmp {
            if let Err(e) = self.archive_locked(&mut state, &store_path, true) {
                info!(target: "kash.store", error = %e, "could not archive existing file");
            }
        }

        self.write_file(item, &full_path, options)?;
        self.apply_times(item, &full_path);

        // Diff-and-skip: when the content equals the previous similarly
        // named item, keep the old file and drop the new one.
        let mut final_path = store_path;
        let mut skipped_save = false;
        if let Some(old_sp) = old_store_path {
            if let (Ok(old_item), Ok(new_item)) = (self.load(&old_sp), self.load(&final_path)) {
                if new_item.content_equals(&old_item) {
                    info!(
                        target: "kash.store",
                        old = %old_sp,
                        "new item is identical to previous version, keeping old item"
                    );
                    let _ = fs::remove_file(&full_path);
                    final_path = old_sp;
                    skipped_save = true;
                }
            }
        }

        item.store_path = Some(final_path.clone());
        self.index_saved_item_locked(&mut state, item, &final_path);

        if skipped_save {
            debug!(target: "kash.store", path = %final_path, "already saved");
        } else {
            info!(target: "kash.store", path = %final_path, "saved item");
        }
        Ok(final_path)
    }

    fn index_saved_item_locked(&self, state: &mut StoreState, item: &Item, sp: &StorePath) {
        if let Ok(parsed) = parse_item_filename(sp.as_path()) {
            state.uniquifier.add(&parsed.name, &parsed.full_suffix());
        }
        if let Some(id) = item.item_id() {
            state.id_map.insert(id, sp.clone());
        }
    }

    fn write_file(&self, item: &mut Item, full_path: &Path, options: SaveOptions) -> Result<()> {
        let supports_frontmatter = item.format.is_none_or(|f| f.supports_frontmatter());

        if options.no_frontmatter || !supports_frontmatter {
            let Some(external) = item.external_path.clone() else {
                return Err(KashError::InvalidOperation(format!(
                    "cannot save item without a source file: {}",
                    item.fmt_loc()
                )));
            };
            if let Some(parent) = full_path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| KashError::io(format!("create dir {}", parent.display()), e))?;
            }
            let tmp = tempfile::NamedTempFile::new_in(
                full_path.parent().unwrap_or(&self.base_dir),
            )
            .map_err(|e| KashError::io("create temp file", e))?;
            fs::copy(&external, tmp.path())
                .map_err(|e| KashError::io(format!("copy {}", external.display()), e))?;
            tmp.persist(full_path)
                .map_err(|e| KashError::io(format!("rename into {}", full_path.display()), e.error))?;

            if item.is_binary() {
                write_sidecar_meta(item, full_path)?;
            }
            return Ok(());
        }

        // Text path: pull in an external body if the item has one.
        if let Some(external) = item.external_path.take() {
            let body = fs::read_to_string(&external)
                .map_err(|e| KashError::io(format!("read {}", external.display()), e))?;
            item.body = Some(body);
        }
        write_item(item, full_path, !options.no_format)
    }

    fn apply_times(&self, item: &Item, full_path: &Path) {
        let mtime = item.modified_at.unwrap_or(item.created_at);
        if let Ok(file) = fs::File::options().write(true).open(full_path) {
            let _ = file.set_modified(mtime.into());
        }
    }

    // -- Import ----------------------------------------------------------

    /// Import a URL or file into the store as an item.
    ///
    /// URLs become `resource` items with `format=url` after
    /// canonicalization. Text files are read fully (frontmatter-aware);
    /// binaries are copied as-is. Unless `reimport` is set, locators
    /// already in the store are detected (by id or content hash) and the
    /// prior path is returned.
    ///
    /// # Errors
    ///
    /// Returns [`KashError::FileNotFound`] for missing files, or
    /// [`KashError::FileExists`] when a binary target already exists on a
    /// reimport collision.
    pub fn import_item(
        &self,
        locator: &str,
        as_type: Option<ItemType>,
        reimport: bool,
    ) -> Result<StorePath> {
        if is_url(locator) {
            let url = canonicalize_url(locator);
            if url != locator {
                info!(target: "kash.store", original = locator, canonical = %url, "canonicalized URL");
            }
            let mut item = Item::from_url(&url);
            if let Some(t) = as_type {
                item.item_type = t;
            }
            if !reimport {
                if let Some(previous) = self.find_by_id(&item) {
                    info!(target: "kash.store", path = %previous, url = %url, "workspace already has this URL");
                    return Ok(previous);
                }
            }
            return self.save(&mut item, SaveOptions::default());
        }

        // A store path (including `@`-mention forms) that already exists.
        if !Path::new(locator).is_absolute() {
            if let Ok(sp) = StorePath::parse(locator) {
                if self.exists(&sp) && !reimport {
                    debug!(target: "kash.store", path = %sp, "store path already imported");
                    return Ok(sp);
                }
            }
        }

        // A path, inside or outside the store.
        let path = Path::new(locator);
        let abs = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| KashError::io("resolve current dir", e))?
                .join(path)
        };

        if let Ok(rel) = abs.strip_prefix(&self.base_dir) {
            let sp = StorePath::from_rel_path(rel)?;
            if self.exists(&sp) && !reimport {
                info!(target: "kash.store", path = %sp, "path already imported");
                return Ok(sp);
            }
        }
        if !abs.exists() {
            return Err(KashError::FileNotFound(abs.display().to_string()));
        }

        let probe = Item::from_external_path(&abs, as_type)?;

        if probe.format.is_some_and(|f| f.supports_frontmatter()) {
            info!(target: "kash.store", path = %abs.display(), "importing text file");
            let mut item = read_item(&abs, &self.base_dir)?;
            item.external_path = None;
            item.store_path = None;
            if let Some(t) = as_type {
                if item.item_type != t {
                    warn!(
                        target: "kash.store",
                        requested = %t,
                        found = %item.item_type,
                        "importing with overridden item type"
                    );
                    item.item_type = t;
                }
            }
            if item.original_filename.is_none() {
                item.original_filename = abs
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string);
            }
            return self.save(&mut item, SaveOptions::default());
        }

        // Binary or unrecognized: copy the file as-is.
        let mut item = probe;
        let (store_path, old_store_path) = self.store_path_for(&item, SaveOptions::default())?;
        if self.exists(&store_path) {
            return Err(KashError::FileExists(store_path.to_string()));
        }

        info!(target: "kash.store", path = %abs.display(), "importing resource");
        let full_path = self.abs_path(&store_path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| KashError::io(format!("create dir {}", parent.display()), e))?;
        }
        fs::copy(&abs, &full_path)
            .map_err(|e| KashError::io(format!("copy {}", abs.display()), e))?;
        item.external_path = Some(full_path.clone());
        write_sidecar_meta(&item, &full_path)?;

        // Identical re-imports reuse the prior path.
        let mut final_path = store_path;
        if let Some(old_sp) = old_store_path {
            if self.hash(&old_sp).ok() == self.hash(&final_path).ok() {
                info!(
                    target: "kash.store",
                    path = %old_sp,
                    "imported resource is identical to the previous import"
                );
                let _ = fs::remove_file(&full_path);
                let _ = fs::remove_file(sidecar_path(&full_path));
                final_path = old_sp;
            }
        }

        item.store_path = Some(final_path.clone());
        let mut state = lock_state(&self.state);
        self.index_saved_item_locked(&mut state, &item, &final_path);
        info!(target: "kash.store", path = %final_path, "imported resource");
        Ok(final_path)
    }

    /// Import a locator and load the resulting item.
    ///
    /// # Errors
    ///
    /// Propagates import and load failures.
    pub fn import_and_load(&self, locator: &str) -> Result<Item> {
        let sp = self.import_item(locator, None, false)?;
        self.load(&sp)
    }

    // -- Archive ---------------------------------------------------------

    /// Move an item into the archive directory, preserving its sub-path.
    ///
    /// # Errors
    ///
    /// Returns an error if the move fails.
    pub fn archive(&self, store_path: &StorePath, missing_ok: bool) -> Result<StorePath> {
        let mut state = lock_state(&self.state);
        self.archive_locked(&mut state, store_path, missing_ok)
    }

    fn archive_locked(
        &self,
        state: &mut StoreState,
        store_path: &StorePath,
        missing_ok: bool,
    ) -> Result<StorePath> {
        let orig = self.abs_path(store_path);
        if !orig.exists() {
            if missing_ok {
                info!(target: "kash.store", path = %store_path, "item to archive not found, moving on");
                return Ok(store_path.clone());
            }
            return Err(KashError::FileNotFound(store_path.to_string()));
        }

        // Capture the id before the file moves.
        let item_id = self.load(store_path).ok().and_then(|item| item.item_id());

        let archive_sp = StorePath::from_rel_path(Path::new(ARCHIVE_DIR).join(store_path.as_path()))?;
        let dest = self.abs_path(&archive_sp);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| KashError::io(format!("create dir {}", parent.display()), e))?;
        }
        fs::rename(&orig, &dest)
            .map_err(|e| KashError::io(format!("archive {}", store_path), e))?;
        let sidecar = sidecar_path(&orig);
        if sidecar.exists() {
            let _ = fs::rename(&sidecar, sidecar_path(&dest));
        }

        info!(target: "kash.store", path = %store_path, "archived item");
        state.selections.remove_values(std::slice::from_ref(store_path));
        self.unindex_item_locked(state, item_id, store_path);
        Ok(archive_sp)
    }

    /// Move an item back out of the archive. The path may be given with or
    /// without the `archive/` prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the archived file is missing or the move fails.
    pub fn unarchive(&self, store_path: &StorePath) -> Result<StorePath> {
        let rel = store_path
            .as_path()
            .strip_prefix(ARCHIVE_DIR)
            .unwrap_or(store_path.as_path());
        let original_sp = StorePath::from_rel_path(rel)?;
        let archived = self
            .abs_path(&StorePath::from_rel_path(Path::new(ARCHIVE_DIR).join(rel))?);
        if !archived.exists() {
            return Err(KashError::FileNotFound(archived.display().to_string()));
        }

        let dest = self.abs_path(&original_sp);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| KashError::io(format!("create dir {}", parent.display()), e))?;
        }
        fs::rename(&archived, &dest)
            .map_err(|e| KashError::io(format!("unarchive {}", original_sp), e))?;
        let sidecar = sidecar_path(&archived);
        if sidecar.exists() {
            let _ = fs::rename(&sidecar, sidecar_path(&dest));
        }

        let mut state = lock_state(&self.state);
        self.index_item_locked(&mut state, &original_sp);
        info!(target: "kash.store", path = %original_sp, "unarchived item");
        Ok(original_sp)
    }

    // -- Walk ------------------------------------------------------------

    /// Store paths of all items under `base` (or the whole workspace),
    /// honoring the ignore filter. Sidecar metadata files are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the walk fails at the filesystem level.
    pub fn walk_items(&self, base: Option<&StorePath>) -> Result<Vec<StorePath>> {
        let start = match base {
            Some(sp) => self.abs_path(sp),
            None => self.base_dir.clone(),
        };
        if !start.exists() {
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        let walker = walkdir::WalkDir::new(&start)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                let rel = entry.path().strip_prefix(&self.base_dir).unwrap_or(entry.path());
                rel.as_os_str().is_empty() || !self.ignore.is_ignored(rel)
            });

        for entry in walker {
            let entry = entry.map_err(|e| {
                KashError::io("walk store", std::io::Error::other(e.to_string()))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = match entry.path().strip_prefix(&self.base_dir) {
                Ok(rel) => rel,
                Err(_) => continue,
            };
            if rel
                .to_string_lossy()
                .ends_with(crate::frontmatter::META_SUFFIX)
            {
                continue;
            }
            if let Ok(sp) = StorePath::from_rel_path(rel) {
                paths.push(sp);
            }
        }
        Ok(paths)
    }

    /// Load then save an item, refreshing its file to the current format.
    ///
    /// # Errors
    ///
    /// Propagates load and save failures.
    pub fn normalize(&self, store_path: &StorePath, options: SaveOptions) -> Result<StorePath> {
        let mut item = self.load(store_path)?;
        self.save(&mut item, options)
    }

    // -- Selections ------------------------------------------------------

    /// Push a selection onto the history.
    pub fn push_selection(&self, selection: Selection) {
        lock_state(&self.state).selections.push(selection);
    }

    /// The current selection, if any.
    #[must_use]
    pub fn current_selection(&self) -> Option<Selection> {
        lock_state(&self.state).selections.current().cloned()
    }

    /// Move to the previous selection.
    ///
    /// # Errors
    ///
    /// Returns [`KashError::InvalidOperation`] at the start of the history.
    pub fn previous_selection(&self) -> Result<Selection> {
        lock_state(&self.state)
            .selections
            .previous()
            .map(Selection::clone)
    }

    /// Move to the next selection.
    ///
    /// # Errors
    ///
    /// Returns [`KashError::InvalidOperation`] at the end of the history.
    pub fn next_selection(&self) -> Result<Selection> {
        lock_state(&self.state)
            .selections
            .next()
            .map(Selection::clone)
    }

    /// Drop paths no longer present on disk from the selection history.
    pub fn refresh_selections(&self) {
        let mut state = lock_state(&self.state);
        let base_dir = self.base_dir.clone();
        state
            .selections
            .refresh(|sp| base_dir.join(sp.as_path()).exists());
    }

    // -- Params ----------------------------------------------------------

    /// The workspace-level raw parameter values.
    #[must_use]
    pub fn params(&self) -> kash_core::params::RawParamValues {
        lock_state(&self.state).params.get_raw_values().clone()
    }

    /// Set a workspace-level parameter value.
    ///
    /// # Errors
    ///
    /// Returns an error if the params file cannot be written.
    pub fn set_param(&self, name: &str, value: kash_core::params::RawValue) -> Result<()> {
        lock_state(&self.state).params.set(name, value)
    }

    /// Log a short summary of the workspace.
    pub fn log_workspace_info(&self) {
        let state = lock_state(&self.state);
        info!(
            target: "kash.store",
            workspace = %self.base_dir.display(),
            items = state.uniquifier.len(),
            "using workspace"
        );
        for warning in &state.warnings {
            warn!(target: "kash.store", "{warning}");
        }
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("base_dir", &self.base_dir)
            .field("name", &self.name)
            .finish()
    }
}
