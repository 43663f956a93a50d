// SPDX-License-Identifier: MIT OR Apache-2.0
//! Input resolution: locators to items, selection fallback.

use crate::actions::ActionInput;
use kash_error::Result;
use kash_store::store::SaveOptions;
use kash_store::FileStore;
use kash_web::{fetch_url_item_metadata, WebFetcher};
use tracing::{debug, info};

/// Collect the effective arguments for an action: the provided args, or
/// the current selection when the action uses it. The boolean reports
/// whether the selection supplied them.
#[must_use]
pub fn assemble_action_args(
    provided: &[String],
    use_selection: bool,
    ws: &FileStore,
) -> (Vec<String>, bool) {
    if !provided.is_empty() {
        return (provided.to_vec(), false);
    }
    if use_selection {
        if let Some(selection) = ws.current_selection() {
            let paths: Vec<String> = selection.paths.iter().map(ToString::to_string).collect();
            if !paths.is_empty() {
                debug!(target: "kash.exec", count = paths.len(), "using selection as inputs");
                return (paths, true);
            }
        }
    }
    (Vec::new(), false)
}

/// Resolve each input locator (URL, path, or store path) into an item,
/// importing into the workspace as needed. URL resources missing a title
/// get their metadata fetched (best-effort) and re-saved.
///
/// # Errors
///
/// Returns an error when a locator cannot be imported or loaded.
pub fn assemble_action_input(
    ws: &FileStore,
    fetcher: Option<&dyn WebFetcher>,
    args: &[String],
) -> Result<ActionInput> {
    let mut items = Vec::with_capacity(args.len());
    for arg in args {
        let sp = ws.import_item(arg, None, false)?;
        let mut item = ws.load(&sp)?;

        let is_bare_url_item =
            item.url.is_some() && (item.title.is_none() || item.description.is_none());
        if is_bare_url_item {
            if let Some(fetcher) = fetcher {
                let fetched = fetch_url_item_metadata(fetcher, item.clone());
                if fetched.title != item.title
                    || fetched.description != item.description
                    || fetched.thumbnail_url != item.thumbnail_url
                {
                    item = fetched;
                    info!(target: "kash.exec", path = %sp, "updating URL item with fetched metadata");
                    ws.save(&mut item, SaveOptions::default())?;
                }
            }
        }
        items.push(item);
    }
    Ok(ActionInput::new(items))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use kash_core::formats::Format;
    use kash_core::items::{Item, ItemType};
    use kash_error::KashError;
    use kash_store::Selection;
    use std::path::Path;

    struct StubFetcher;
    impl WebFetcher for StubFetcher {
        fn fetch_text(&self, _url: &str) -> Result<String> {
            Ok("<html><head><title>Fetched Title</title>\
                <meta name=\"description\" content=\"Fetched description.\">\
                </head><body></body></html>"
                .to_string())
        }
        fn download(&self, _url: &str, _dest: &Path) -> Result<()> {
            Err(KashError::SetupError("not needed".into()))
        }
    }

    fn setup() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let ws = FileStore::open(dir.path(), true).unwrap();
        (dir, ws)
    }

    #[test]
    fn provided_args_win_over_selection() {
        let (_dir, ws) = setup();
        ws.push_selection(Selection::new(vec![kash_core::paths::StorePath::parse(
            "docs/sel.doc.md",
        )
        .unwrap()]));

        let (args, from_selection) =
            assemble_action_args(&["docs/x.doc.md".into()], true, &ws);
        assert_eq!(args, ["docs/x.doc.md"]);
        assert!(!from_selection);
    }

    #[test]
    fn selection_fills_missing_args() {
        let (_dir, ws) = setup();
        let mut item = Item::new(ItemType::Doc);
        item.title = Some("Sel".into());
        item.format = Some(Format::Markdown);
        item.body = Some("b\n".into());
        let sp = ws.save(&mut item, SaveOptions::default()).unwrap();
        ws.push_selection(Selection::new(vec![sp.clone()]));

        let (args, from_selection) = assemble_action_args(&[], true, &ws);
        assert_eq!(args, [sp.to_string()]);
        assert!(from_selection);

        // Actions that don't use the selection get nothing.
        let (args, from_selection) = assemble_action_args(&[], false, &ws);
        assert!(args.is_empty());
        assert!(!from_selection);
    }

    #[test]
    fn urls_are_imported_and_enriched() {
        let (_dir, ws) = setup();
        let input = assemble_action_input(
            &ws,
            Some(&StubFetcher),
            &["https://example.com/page".into()],
        )
        .unwrap();

        assert_eq!(input.len(), 1);
        let item = &input.items[0];
        assert_eq!(item.title.as_deref(), Some("Fetched Title"));
        assert_eq!(item.description.as_deref(), Some("Fetched description."));
        assert!(item.store_path.is_some());

        // The enriched metadata was persisted.
        let reloaded = ws.load(item.store_path.as_ref().unwrap()).unwrap();
        assert_eq!(reloaded.title.as_deref(), Some("Fetched Title"));
    }

    #[test]
    fn store_paths_load_existing_items() {
        let (_dir, ws) = setup();
        let mut item = Item::new(ItemType::Doc);
        item.title = Some("Existing".into());
        item.format = Some(Format::Markdown);
        item.body = Some("content\n".into());
        let sp = ws.save(&mut item, SaveOptions::default()).unwrap();

        let input = assemble_action_input(&ws, None, &[sp.to_string()]).unwrap();
        assert_eq!(input.len(), 1);
        assert_eq!(input.items[0].title.as_deref(), Some("Existing"));
    }

    #[test]
    fn missing_locator_is_an_error() {
        let (_dir, ws) = setup();
        let err = assemble_action_input(&ws, None, &["/no/such/file.md".into()]).unwrap_err();
        assert!(matches!(err, KashError::FileNotFound(_)));
    }
}
