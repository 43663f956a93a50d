// SPDX-License-Identifier: MIT OR Apache-2.0
//! The precondition matching engine.

use crate::actions::Action;
use kash_core::items::Item;
use kash_core::paths::StorePath;
use kash_core::preconditions::Precondition;
use kash_error::Result;
use kash_store::FileStore;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Which of the given actions are applicable to all of the given paths.
///
/// An action matches when its precondition is satisfied by the loaded item
/// at every path. Actions without a precondition are excluded unless
/// `include_no_precondition` is set.
///
/// # Errors
///
/// Returns an error if an item at one of the paths cannot be loaded.
pub fn actions_matching_paths(
    actions: &[Arc<dyn Action>],
    ws: &FileStore,
    paths: &[StorePath],
    include_no_precondition: bool,
) -> Result<Vec<Arc<dyn Action>>> {
    let items: Vec<Item> = paths
        .iter()
        .map(|sp| ws.load(sp))
        .collect::<Result<Vec<_>>>()?;

    let mut matching = Vec::new();
    for action in actions {
        let ok = match &action.spec().precondition {
            Some(precondition) => items.iter().all(|item| precondition.eval(item)),
            None => include_no_precondition && !items.is_empty(),
        };
        if ok {
            matching.push(Arc::clone(action));
        }
    }
    Ok(matching)
}

/// Walk the workspace and yield items matching the precondition, up to
/// `max_results` (0 for unlimited). Unparseable files are tolerated and
/// skipped; a throughput summary is logged when the walk is slow.
///
/// # Errors
///
/// Returns an error only if the walk itself fails.
pub fn items_matching_precondition(
    ws: &FileStore,
    precondition: &Precondition,
    max_results: usize,
) -> Result<Vec<(StorePath, Item)>> {
    let start = Instant::now();
    let mut matched = Vec::new();
    let mut files_checked = 0usize;

    for sp in ws.walk_items(None)? {
        if max_results > 0 && matched.len() >= max_results {
            break;
        }
        files_checked += 1;
        let item = match ws.load(&sp) {
            Ok(item) => item,
            Err(e) if e.is_skippable() => continue,
            Err(e) => {
                debug!(target: "kash.exec", path = %sp, error = %e, "ignoring item during match walk");
                continue;
            }
        };
        if precondition.eval(&item) {
            matched.push((sp, item));
        }
    }

    let elapsed = start.elapsed();
    if elapsed.as_secs_f64() > 0.1 {
        info!(
            target: "kash.exec",
            matched = matched.len(),
            checked = files_checked,
            elapsed_ms = elapsed.as_millis() as u64,
            rate = (files_checked as f64 / elapsed.as_secs_f64()) as u64,
            "matched items"
        );
    }
    Ok(matched)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ActionBuilder, ActionResult};
    use crate::preconditions::{has_body, is_doc, is_resource};
    use kash_core::formats::Format;
    use kash_core::items::ItemType;
    use kash_store::store::SaveOptions;

    fn action_with(name: &str, precondition: Option<Precondition>) -> Arc<dyn Action> {
        let mut builder = ActionBuilder::new(name, "test");
        if let Some(p) = precondition {
            builder = builder.precondition(p);
        }
        Arc::new(
            builder
                .run(|input, _| Ok(ActionResult::new(input.items)))
                .build()
                .unwrap(),
        )
    }

    fn setup() -> (tempfile::TempDir, FileStore, StorePath, StorePath) {
        let dir = tempfile::tempdir().unwrap();
        let ws = FileStore::open(dir.path(), true).unwrap();

        let mut doc = Item::new(ItemType::Doc);
        doc.title = Some("Doc".into());
        doc.format = Some(Format::Markdown);
        doc.body = Some("body text\n".into());
        let doc_sp = ws.save(&mut doc, SaveOptions::default()).unwrap();

        let mut resource = Item::from_url("https://example.com/empty");
        let res_sp = ws.save(&mut resource, SaveOptions::default()).unwrap();

        (dir, ws, doc_sp, res_sp)
    }

    #[test]
    fn matching_requires_all_paths_to_satisfy() {
        let (_dir, ws, doc_sp, res_sp) = setup();

        let a = action_with("a", Some(is_doc() & has_body()));
        let b = action_with("b", Some(is_resource()));
        let c = action_with("c", None);
        let actions = vec![a, b, c];

        // No single action is valid for both a doc and a resource.
        let both = actions_matching_paths(
            &actions,
            &ws,
            &[doc_sp.clone(), res_sp.clone()],
            false,
        )
        .unwrap();
        assert!(both.is_empty());

        let doc_only = actions_matching_paths(&actions, &ws, &[doc_sp.clone()], false).unwrap();
        let names: Vec<&str> = doc_only.iter().map(|a| a.spec().name.as_str()).collect();
        assert_eq!(names, ["a"]);

        let with_no_precondition =
            actions_matching_paths(&actions, &ws, &[doc_sp], true).unwrap();
        let names: Vec<&str> = with_no_precondition
            .iter()
            .map(|a| a.spec().name.as_str())
            .collect();
        assert_eq!(names, ["a", "c"]);

        let res_only = actions_matching_paths(&actions, &ws, &[res_sp], false).unwrap();
        let names: Vec<&str> = res_only.iter().map(|a| a.spec().name.as_str()).collect();
        assert_eq!(names, ["b"]);
    }

    #[test]
    fn items_matching_walks_and_filters() {
        let (_dir, ws, doc_sp, _res_sp) = setup();

        // A stray unparseable file is tolerated.
        std::fs::write(ws.base_dir().join("docs/notes.weird"), "???").unwrap();

        let matched = items_matching_precondition(&ws, &has_body(), 0).unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].0, doc_sp);

        let limited = items_matching_precondition(&ws, &has_body(), 1).unwrap();
        assert_eq!(limited.len(), 1);

        let none = items_matching_precondition(
            &ws,
            &Precondition::new("never_matches", |_| false),
            0,
        )
        .unwrap();
        assert!(none.is_empty());
    }
}
