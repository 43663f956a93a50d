// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end pipeline tests: rerun avoidance, per-item loops with mixed
//! outcomes, selection handling, and validation.

use kash_core::formats::Format;
use kash_core::items::{Item, ItemType};
use kash_core::params::{Param, ParamType, RawParamValues, TypedParamValues};
use kash_core::paths::StorePath;
use kash_error::KashError;
use kash_exec::{
    register_all, run_action, run_action_with_selection, ActionBuilder, ActionInput, ActionMeta,
    ActionRegistry, ExecContext, RuntimeSettings, NO_ARGS,
};
use kash_exec::preconditions::{has_body, is_doc};
use kash_store::store::SaveOptions;
use kash_store::{FileStore, Selection};
use std::sync::Arc;

fn setup() -> (tempfile::TempDir, Arc<FileStore>, ActionRegistry) {
    let dir = tempfile::tempdir().unwrap();
    let ws = Arc::new(FileStore::open(dir.path(), true).unwrap());
    let registry = ActionRegistry::new();
    register_all(&registry).unwrap();
    (dir, ws, registry)
}

fn save_doc(ws: &FileStore, title: &str, body: &str) -> StorePath {
    let mut item = Item::new(ItemType::Doc);
    item.title = Some(title.into());
    item.format = Some(Format::Markdown);
    item.body = Some(body.into());
    ws.save(&mut item, SaveOptions::default()).unwrap()
}

fn settings(ws: &FileStore) -> RuntimeSettings {
    RuntimeSettings {
        workspace_dir: ws.base_dir().to_path_buf(),
        ..RuntimeSettings::default()
    }
}

// ---------------------------------------------------------------------------
// Rerun avoidance
// ---------------------------------------------------------------------------

#[test]
fn cacheable_rerun_is_skipped_and_forced_rerun_archives() {
    let (_dir, ws, registry) = setup();
    let input_sp = save_doc(&ws, "Shouty Doc", "HELLO World\n");
    let args = vec![input_sp.to_string()];

    let first = run_action_with_selection(
        Arc::clone(&ws),
        &registry,
        None,
        "lowercase",
        &RawParamValues::new(),
        &args,
        settings(&ws),
    )
    .unwrap();
    assert!(!first.skipped_rerun);
    assert_eq!(first.saved_paths.len(), 1);
    let output_sp = first.saved_paths[0].clone();
    assert_eq!(
        ws.load(&output_sp).unwrap().body.as_deref(),
        Some("hello world\n")
    );
    let mtime_after_first = std::fs::metadata(ws.abs_path(&output_sp))
        .unwrap()
        .modified()
        .unwrap();

    // Second run: identical inputs, so the run is skipped and the cached
    // output is returned without rewriting the file.
    let second = run_action_with_selection(
        Arc::clone(&ws),
        &registry,
        None,
        "lowercase",
        &RawParamValues::new(),
        &args,
        settings(&ws),
    )
    .unwrap();
    assert!(second.skipped_rerun);
    assert_eq!(second.saved_paths, first.saved_paths);
    let mtime_after_second = std::fs::metadata(ws.abs_path(&output_sp))
        .unwrap()
        .modified()
        .unwrap();
    assert_eq!(mtime_after_first, mtime_after_second, "file was rewritten");

    // Forced rerun rewrites the output and archives the prior version.
    let forced = run_action_with_selection(
        Arc::clone(&ws),
        &registry,
        None,
        "lowercase",
        &RawParamValues::new(),
        &args,
        RuntimeSettings {
            rerun: true,
            ..settings(&ws)
        },
    )
    .unwrap();
    assert!(!forced.skipped_rerun);
    assert_eq!(forced.saved_paths, first.saved_paths);
    let archived = ws
        .base_dir()
        .join("archive")
        .join(output_sp.as_path());
    assert!(archived.exists(), "prior version should be archived");
}

// ---------------------------------------------------------------------------
// Per-item loop with mixed outcomes
// ---------------------------------------------------------------------------

#[test]
fn per_item_loop_continues_past_nonfatal_errors() {
    let (_dir, ws, registry) = setup();

    let grep = ActionBuilder::new("grep", "Keep only lines matching a pattern.")
        .precondition(has_body())
        .param(Param::new("pattern", ParamType::Str).explicit())
        .run_per_item(|item, context| {
            let pattern = context
                .params
                .get_str("pattern")
                .ok_or_else(|| KashError::InvalidInput("pattern required".into()))?;
            let matching: Vec<&str> = item
                .body_text()
                .lines()
                .filter(|l| l.contains(pattern))
                .collect();
            if matching.is_empty() {
                return Err(KashError::ContentError("no match".into()));
            }
            let mut out = context.derive_output(item);
            out.body = Some(matching.join("\n"));
            Ok(out)
        })
        .build()
        .unwrap();
    registry.register(Arc::new(grep));

    let a = save_doc(&ws, "First", "keep this line\nnot that one\n");
    let b = save_doc(&ws, "Second", "nothing relevant here\n");
    let c = save_doc(&ws, "Third", "keep another line\n");
    let args = vec![a.to_string(), b.to_string(), c.to_string()];

    let mut params = RawParamValues::new();
    params.set("pattern", "keep");

    let outcome = run_action_with_selection(
        Arc::clone(&ws),
        &registry,
        None,
        "grep",
        &params,
        &args,
        settings(&ws),
    )
    .unwrap();

    // The failing middle item is logged and skipped; two outputs remain.
    assert_eq!(outcome.result.items.len(), 2);
    assert_eq!(outcome.saved_paths.len(), 2);

    // The selection points at the two outputs.
    let selection = ws.current_selection().unwrap();
    assert_eq!(selection.paths, outcome.saved_paths);
}

#[test]
fn single_input_nonfatal_error_is_reraised() {
    let (_dir, ws, registry) = setup();

    let failing = ActionBuilder::new("always_fails", "Always errors.")
        .run_per_item(|_item, _ctx| Err(KashError::ContentError("nope".into())))
        .build()
        .unwrap();
    registry.register(Arc::new(failing));

    let sp = save_doc(&ws, "Only", "text\n");
    let err = run_action_with_selection(
        Arc::clone(&ws),
        &registry,
        None,
        "always_fails",
        &RawParamValues::new(),
        &[sp.to_string()],
        settings(&ws),
    )
    .unwrap_err();
    assert!(matches!(err, KashError::ContentError(_)));
}

#[test]
fn skip_item_passes_items_through() {
    let (_dir, ws, registry) = setup();

    let skipper = ActionBuilder::new("maybe_skip", "Skips short items.")
        .run_per_item(|item, context| {
            if item.body_text().len() < 10 {
                return Err(KashError::SkipItem);
            }
            let mut out = context.derive_output(item);
            out.body = Some(item.body_text().to_uppercase());
            Ok(out)
        })
        .build()
        .unwrap();
    registry.register(Arc::new(skipper));

    let short = save_doc(&ws, "Short", "tiny\n");
    let long = save_doc(&ws, "Long", "long enough to transform\n");

    let outcome = run_action_with_selection(
        Arc::clone(&ws),
        &registry,
        None,
        "maybe_skip",
        &RawParamValues::new(),
        &[short.to_string(), long.to_string()],
        settings(&ws),
    )
    .unwrap();

    assert_eq!(outcome.result.items.len(), 2);
    // The skipped item passed through with its body unchanged.
    assert_eq!(outcome.result.items[0].body.as_deref(), Some("tiny\n"));
    assert_eq!(
        outcome.result.items[1].body.as_deref(),
        Some("LONG ENOUGH TO TRANSFORM\n")
    );
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[test]
fn precondition_failures_block_the_run() {
    let (_dir, ws, registry) = setup();

    let docs_only = ActionBuilder::new("docs_only", "Docs only.")
        .precondition(is_doc() & has_body())
        .run_per_item(|item, context| Ok(context.derive_output(item)))
        .build()
        .unwrap();
    registry.register(Arc::new(docs_only));

    let mut resource = Item::from_url("https://example.com/thing");
    let sp = ws.save(&mut resource, SaveOptions::default()).unwrap();

    let err = run_action_with_selection(
        Arc::clone(&ws),
        &registry,
        None,
        "docs_only",
        &RawParamValues::new(),
        &[sp.to_string()],
        settings(&ws),
    )
    .unwrap_err();
    match err {
        KashError::PreconditionFailure(msg) => {
            assert!(msg.contains("is_doc & has_body"), "msg: {msg}");
        }
        other => panic!("expected PreconditionFailure, got {other:?}"),
    }
}

#[test]
fn missing_explicit_param_is_invalid_input() {
    let (_dir, ws, registry) = setup();

    let needs_param = ActionBuilder::new("needs_param", "Requires a pattern.")
        .param(Param::new("pattern", ParamType::Str).explicit())
        .run_per_item(|item, context| Ok(context.derive_output(item)))
        .build()
        .unwrap();
    registry.register(Arc::new(needs_param));

    let sp = save_doc(&ws, "Doc", "body\n");
    let err = run_action_with_selection(
        Arc::clone(&ws),
        &registry,
        None,
        "needs_param",
        &RawParamValues::new(),
        &[sp.to_string()],
        settings(&ws),
    )
    .unwrap_err();
    assert!(matches!(err, KashError::InvalidInput(_)));
}

#[test]
fn wrong_arg_count_is_invalid_input() {
    let (_dir, ws, registry) = setup();
    let sp1 = save_doc(&ws, "A", "a\n");
    let sp2 = save_doc(&ws, "B", "b\n");

    // Per-item builders declare exactly one argument.
    let one_arg = ActionBuilder::new("one_arg", "One only.")
        .run_per_item(|item, context| Ok(context.derive_output(item)))
        .build()
        .unwrap();

    let context = ExecContext {
        ws: Arc::clone(&ws),
        settings: settings(&ws),
        params: TypedParamValues::default(),
        action: ActionMeta {
            name: "one_arg".into(),
            title_template: "{title}".into(),
            output_type: ItemType::Doc,
        },
    };
    let input = ActionInput::new(vec![ws.load(&sp1).unwrap(), ws.load(&sp2).unwrap()]);
    let err = run_action(&one_arg, &context, input).unwrap_err();
    assert!(matches!(err, KashError::InvalidInput(_)));
}

// ---------------------------------------------------------------------------
// Selection behavior
// ---------------------------------------------------------------------------

#[test]
fn no_args_action_ignores_selection() {
    let (_dir, ws, registry) = setup();

    let make_note = ActionBuilder::new("make_note", "Create a fixed note.")
        .expected_args(NO_ARGS)
        .run(|input, _context| {
            assert!(input.is_empty(), "no-arg action got inputs");
            let mut item = Item::new(ItemType::Doc);
            item.title = Some("Fresh Note".into());
            item.format = Some(Format::Markdown);
            item.body = Some("note body\n".into());
            Ok(kash_exec::ActionResult::new(vec![item]))
        })
        .build()
        .unwrap();
    registry.register(Arc::new(make_note));

    // A selection exists, but the action must not consume it.
    let selected = save_doc(&ws, "Selected", "s\n");
    ws.push_selection(Selection::new(vec![selected]));

    let outcome = run_action_with_selection(
        Arc::clone(&ws),
        &registry,
        None,
        "make_note",
        &RawParamValues::new(),
        &[],
        settings(&ws),
    )
    .unwrap();
    assert_eq!(outcome.saved_paths.len(), 1);
    assert!(outcome.saved_paths[0].to_string().contains("fresh_note"));
}

#[test]
fn replaces_input_archives_old_inputs() {
    let (_dir, ws, registry) = setup();

    let replace = ActionBuilder::new("cleanup", "Replace the input with a cleaned copy.")
        .run(|input, context| {
            let item = &input.items[0];
            let mut out = context.derive_output(item);
            out.body = Some(item.body_text().trim().to_string() + "\n");
            Ok(kash_exec::ActionResult::new(vec![out]).replacing_input())
        })
        .build()
        .unwrap();
    registry.register(Arc::new(replace));

    let sp = save_doc(&ws, "Messy", "  messy body   \n\n");
    let outcome = run_action_with_selection(
        Arc::clone(&ws),
        &registry,
        None,
        "cleanup",
        &RawParamValues::new(),
        &[sp.to_string()],
        settings(&ws),
    )
    .unwrap();

    assert_eq!(outcome.archived_paths, vec![sp.clone()]);
    assert!(!ws.exists(&sp));
    assert!(ws
        .base_dir()
        .join("archive")
        .join(sp.as_path())
        .exists());

    // Selection points at the replacement only.
    let selection = ws.current_selection().unwrap();
    assert_eq!(selection.paths, outcome.saved_paths);
}
