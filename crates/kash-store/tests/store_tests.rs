// SPDX-License-Identifier: MIT OR Apache-2.0
//! Integration tests for the file store: save/load round trips, path
//! selection, identity reuse, import, archive, and walks.

use kash_core::formats::Format;
use kash_core::items::{Item, ItemType};
use kash_core::operations::{Operation, Source};
use kash_core::paths::StorePath;
use kash_error::KashError;
use kash_store::store::SaveOptions;
use kash_store::{FileStore, Selection};
use std::collections::BTreeMap;
use std::path::Path;

fn open_store(dir: &Path) -> FileStore {
    FileStore::open(dir, true).expect("open store")
}

fn doc(title: &str, body: &str) -> Item {
    let mut item = Item::new(ItemType::Doc);
    item.title = Some(title.into());
    item.format = Some(Format::Markdown);
    item.body = Some(body.into());
    item
}

#[test]
fn open_initializes_workspace_layout() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path());
    assert!(dir.path().join(".kash/selections.yml").is_file());
    assert!(dir.path().join(".kash/params.yml").is_file());
    assert!(dir.path().join("archive").is_dir());
    assert!(store.current_selection().is_none());

    // Opening without auto_init on a fresh dir fails.
    let other = tempfile::tempdir().unwrap();
    let err = FileStore::open(other.path(), false).unwrap_err();
    assert!(matches!(err, KashError::FileNotFound(_)));
}

#[test]
fn save_assigns_typed_slugged_path_and_roundtrips() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path());

    let mut item = doc("My First Doc", "Hello there.\n");
    let sp = store.save(&mut item, SaveOptions::default()).unwrap();
    assert_eq!(sp.to_string(), "docs/my_first_doc.doc.md");
    assert_eq!(item.store_path.as_ref(), Some(&sp));

    let loaded = store.load(&sp).unwrap();
    assert!(loaded.content_equals(&item));
}

#[test]
fn same_title_different_content_gets_uniquified() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path());

    let mut first = doc("Notes", "one\n");
    let sp1 = store.save(&mut first, SaveOptions::default()).unwrap();

    let mut second = doc("Notes", "two\n");
    let sp2 = store.save(&mut second, SaveOptions::default()).unwrap();

    assert_eq!(sp1.to_string(), "docs/notes.doc.md");
    assert_eq!(sp2.to_string(), "docs/notes_2.doc.md");
}

#[test]
fn identical_content_reuses_previous_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path());

    let mut first = doc("Notes", "same body\n");
    let sp1 = store.save(&mut first, SaveOptions::default()).unwrap();

    let mut second = doc("Notes", "same body\n");
    let sp2 = store.save(&mut second, SaveOptions::default()).unwrap();

    assert_eq!(sp1, sp2);
    assert!(!store.exists(&StorePath::parse("docs/notes_2.doc.md").unwrap()));
}

#[test]
fn save_archives_replaced_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path());

    let mut item = doc("Draft", "v1\n");
    let sp = store.save(&mut item, SaveOptions::default()).unwrap();

    // Saving to the same explicit store path replaces and archives.
    let mut newer = doc("Draft", "v2\n");
    newer.store_path = Some(sp.clone());
    store.save(&mut newer, SaveOptions::default()).unwrap();

    let archived = dir.path().join("archive").join(sp.as_path());
    assert!(archived.exists(), "previous version should be archived");
    let loaded = store.load(&sp).unwrap();
    assert_eq!(loaded.body.as_deref(), Some("v2\n"));
}

#[test]
fn url_items_are_deduplicated_by_canonical_url() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path());

    let sp1 = store
        .import_item("https://example.com/page?utm_source=tw", None, false)
        .unwrap();
    let sp2 = store
        .import_item("https://example.com/page", None, false)
        .unwrap();
    assert_eq!(sp1, sp2);
    assert!(sp1.to_string().starts_with("resources/"));

    let loaded = store.load(&sp1).unwrap();
    assert_eq!(loaded.url.as_deref(), Some("https://example.com/page"));
    assert_eq!(loaded.format, Some(Format::Url));
}

#[test]
fn import_text_file_reads_body() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path());

    let src_dir = tempfile::tempdir().unwrap();
    let src = src_dir.path().join("outside_notes.md");
    std::fs::write(&src, "# Outside\n\nSome text.\n").unwrap();

    let sp = store
        .import_item(src.to_str().unwrap(), None, false)
        .unwrap();
    let item = store.load(&sp).unwrap();
    assert_eq!(item.item_type, ItemType::Doc);
    assert!(item.body.as_deref().unwrap().contains("Some text."));

    // Re-importing the identical file reuses the path.
    let sp2 = store
        .import_item(src.to_str().unwrap(), None, false)
        .unwrap();
    assert_eq!(sp, sp2);
}

#[test]
fn import_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path());
    let err = store
        .import_item("/nonexistent/path.md", None, false)
        .unwrap_err();
    assert!(matches!(err, KashError::FileNotFound(_)));
}

#[test]
fn hash_has_sha1_prefix_and_tracks_content() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path());

    let mut item = doc("Hashable", "abc\n");
    let sp = store.save(&mut item, SaveOptions::default()).unwrap();
    let h1 = store.hash(&sp).unwrap();
    assert!(h1.starts_with("sha1:"));
    assert_eq!(h1, store.hash(&sp).unwrap());
}

#[test]
fn archive_then_unarchive_restores_path() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path());

    let mut item = doc("Archivable", "body\n");
    let sp = store.save(&mut item, SaveOptions::default()).unwrap();
    store.push_selection(Selection::new(vec![sp.clone()]));

    let archived = store.archive(&sp, false).unwrap();
    assert!(archived.to_string().starts_with("archive/"));
    assert!(!store.exists(&sp));
    // The selection no longer references the archived path.
    assert!(store.current_selection().is_none());

    let restored = store.unarchive(&archived).unwrap();
    assert_eq!(restored, sp);
    assert!(store.exists(&sp));

    // Unarchive also accepts the path without the archive prefix.
    store.archive(&sp, false).unwrap();
    let restored = store.unarchive(&sp).unwrap();
    assert_eq!(restored, sp);
}

#[test]
fn walk_items_skips_metadata_archive_and_sidecars() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path());

    let mut a = doc("Alpha", "a\n");
    store.save(&mut a, SaveOptions::default()).unwrap();
    let mut b = doc("Beta", "b\n");
    let sp_b = store.save(&mut b, SaveOptions::default()).unwrap();
    store.archive(&sp_b, false).unwrap();

    let paths = store.walk_items(None).unwrap();
    let names: Vec<String> = paths.iter().map(ToString::to_string).collect();
    assert!(names.contains(&"docs/alpha.doc.md".to_string()));
    assert!(!names.iter().any(|n| n.starts_with("archive/")));
    assert!(!names.iter().any(|n| n.starts_with(".kash/")));
}

#[test]
fn find_by_id_reuses_source_identity() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path());

    let op = Operation::new("lower", vec![], BTreeMap::new());
    let mut item = doc("Derived", "output\n");
    item.update_history(Source::new(op.clone(), 0, true));
    let sp = store.save(&mut item, SaveOptions::default()).unwrap();

    let mut probe = doc("Derived", "different body\n");
    probe.update_history(Source::new(op, 0, true));
    assert_eq!(store.find_by_id(&probe), Some(sp));

    // Non-cacheable sources have no identity.
    let mut unique = doc("Unique", "x\n");
    unique.update_history(Source::new(
        Operation::new("chat", vec![], BTreeMap::new()),
        0,
        false,
    ));
    assert_eq!(store.find_by_id(&unique), None);
}

#[test]
fn reopened_store_rebuilds_index_and_reuses_paths() {
    let dir = tempfile::tempdir().unwrap();
    let sp = {
        let store = open_store(dir.path());
        let mut item = Item::from_url("https://example.com/article");
        store.save(&mut item, SaveOptions::default()).unwrap()
    };

    // A fresh store instance over the same directory sees the same item.
    let store = open_store(dir.path());
    let probe = Item::from_url("https://example.com/article");
    assert_eq!(store.find_by_id(&probe), Some(sp.clone()));

    // And a fresh save of the same URL reuses the path.
    let mut again = Item::from_url("https://example.com/article");
    let sp2 = store.save(&mut again, SaveOptions::default()).unwrap();
    assert_eq!(sp, sp2);
}

#[test]
fn selection_history_persists_across_opens() {
    let dir = tempfile::tempdir().unwrap();
    let sp = {
        let store = open_store(dir.path());
        let mut item = doc("Selected", "s\n");
        let sp = store.save(&mut item, SaveOptions::default()).unwrap();
        store.push_selection(Selection::new(vec![sp.clone()]));
        sp
    };

    let store = open_store(dir.path());
    assert_eq!(store.current_selection(), Some(Selection::new(vec![sp])));
}

#[test]
fn refresh_drops_selections_for_deleted_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path());
    let mut item = doc("Gone", "g\n");
    let sp = store.save(&mut item, SaveOptions::default()).unwrap();
    store.push_selection(Selection::new(vec![sp.clone()]));

    std::fs::remove_file(store.abs_path(&sp)).unwrap();
    store.refresh_selections();
    assert!(store.current_selection().is_none());
}

#[test]
fn mtime_follows_item_timestamps() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path());

    let mut item = doc("Timed", "t\n");
    item.created_at = chrono::DateTime::parse_from_rfc3339("2023-05-01T12:00:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    let sp = store.save(&mut item, SaveOptions::default()).unwrap();

    let mtime = std::fs::metadata(store.abs_path(&sp))
        .unwrap()
        .modified()
        .unwrap();
    let mtime: chrono::DateTime<chrono::Utc> = mtime.into();
    assert_eq!(mtime.format("%Y-%m-%d").to_string(), "2023-05-01");
}

#[test]
fn normalize_is_load_then_save() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path());

    // Hand-write a file with trailing whitespace and no frontmatter.
    let raw = dir.path().join("docs/raw_notes.doc.md");
    std::fs::create_dir_all(raw.parent().unwrap()).unwrap();
    std::fs::write(&raw, "line one   \nline two\n\n\n").unwrap();

    let sp = StorePath::parse("docs/raw_notes.doc.md").unwrap();
    let normalized = store.normalize(&sp, SaveOptions::default()).unwrap();
    let content = std::fs::read_to_string(store.abs_path(&normalized)).unwrap();
    assert!(content.starts_with("---\n"));
    assert!(content.contains("line one\nline two\n"));
}

#[test]
fn binary_import_copies_file_with_sidecar() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path());

    let src_dir = tempfile::tempdir().unwrap();
    let src = src_dir.path().join("picture.png");
    std::fs::write(&src, b"\x89PNG\r\n\x1a\nfake image data").unwrap();

    let sp = store.import_item(src.to_str().unwrap(), None, false).unwrap();
    assert!(sp.to_string().starts_with("resources/"));
    assert!(store.abs_path(&sp).exists());

    let item = store.load(&sp).unwrap();
    assert_eq!(item.format, Some(Format::Png));
    assert!(item.external_path.is_some());
}
