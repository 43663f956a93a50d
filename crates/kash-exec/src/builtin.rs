// SPDX-License-Identifier: MIT OR Apache-2.0
//! Built-in actions.
//!
//! A small set of core transformations, registered by [`register_all`].
//! Registration is idempotent: re-registering replaces the previous
//! binding with a warning.

use crate::actions::ActionBuilder;
use crate::preconditions::{has_body, is_markdown};
use crate::registry::ActionRegistry;
use kash_core::items::html_to_plaintext;
use kash_error::{KashError, Result};
use std::sync::Arc;
use tracing::info;

/// `copy_item`: duplicate an item as a derived copy.
fn copy_item() -> Result<crate::actions::FnAction> {
    ActionBuilder::new("copy_item", "Make a copy of an item.")
        .title_template("{title} (copy)")
        .run_per_item(|item, context| {
            let mut out = context.derive_output(item);
            out.item_type = item.item_type;
            Ok(out)
        })
        .build()
}

/// `lowercase`: lowercase the body text.
fn lowercase() -> Result<crate::actions::FnAction> {
    ActionBuilder::new("lowercase", "Lowercase the body text of an item.")
        .precondition(has_body())
        .run_per_item(|item, context| {
            let mut out = context.derive_output(item);
            out.body = Some(item.body_text().to_lowercase());
            Ok(out)
        })
        .build()
}

/// `strip_html`: remove HTML tags from the body.
fn strip_html() -> Result<crate::actions::FnAction> {
    ActionBuilder::new("strip_html", "Strip HTML tags from the body of an item.")
        .precondition(has_body())
        .run_per_item(|item, context| {
            let stripped = html_to_plaintext(item.body_text());
            if stripped.trim().is_empty() {
                return Err(KashError::ContentError(format!(
                    "nothing left after stripping tags: {}",
                    item.fmt_loc()
                )));
            }
            let mut out = context.derive_output(item);
            out.body = Some(stripped);
            Ok(out)
        })
        .build()
}

/// `list_format`: normalize Markdown bullet markers to `-`.
fn list_format() -> Result<crate::actions::FnAction> {
    ActionBuilder::new(
        "list_format",
        "Normalize Markdown list bullets to `-` markers.",
    )
    .precondition(is_markdown())
    .run_per_item(|item, context| {
        let normalized: Vec<String> = item
            .body_text()
            .lines()
            .map(|line| {
                let trimmed = line.trim_start();
                let indent_len = line.len() - trimmed.len();
                if let Some(rest) = trimmed
                    .strip_prefix("* ")
                    .or_else(|| trimmed.strip_prefix("+ "))
                {
                    format!("{}- {rest}", &line[..indent_len])
                } else {
                    line.to_string()
                }
            })
            .collect();
        let mut out = context.derive_output(item);
        out.body = Some(normalized.join("\n"));
        Ok(out)
    })
    .build()
}

/// Register every built-in action, returning how many were registered.
///
/// # Errors
///
/// Returns an error if an action definition is invalid (a bug in the
/// definitions themselves).
pub fn register_all(registry: &ActionRegistry) -> Result<usize> {
    let actions: Vec<Arc<dyn crate::actions::Action>> = vec![
        Arc::new(copy_item()?),
        Arc::new(lowercase()?),
        Arc::new(strip_html()?),
        Arc::new(list_format()?),
    ];
    let count = actions.len();
    for action in actions {
        registry.register(action);
    }
    info!(target: "kash.exec", count, "registered built-in actions");
    Ok(count)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{Action, ActionInput, ActionMeta, ExecContext, RuntimeSettings};
    use kash_core::formats::Format;
    use kash_core::items::{Item, ItemType};
    use kash_core::params::TypedParamValues;
    use kash_store::FileStore;

    fn context(name: &str) -> (tempfile::TempDir, ExecContext) {
        let dir = tempfile::tempdir().unwrap();
        let ws = Arc::new(FileStore::open(dir.path(), true).unwrap());
        let context = ExecContext {
            ws,
            settings: RuntimeSettings::default(),
            params: TypedParamValues::default(),
            action: ActionMeta {
                name: name.into(),
                title_template: "{title}".into(),
                output_type: ItemType::Doc,
            },
        };
        (dir, context)
    }

    fn md_doc(body: &str) -> Item {
        let mut item = Item::new(ItemType::Doc);
        item.title = Some("Doc".into());
        item.format = Some(Format::Markdown);
        item.body = Some(body.into());
        item
    }

    #[test]
    fn register_all_is_idempotent() {
        let registry = ActionRegistry::new();
        let first = register_all(&registry).unwrap();
        let second = register_all(&registry).unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.len(), first);
        assert!(registry.contains("lowercase"));
        assert!(registry.contains("strip_html"));
    }

    #[test]
    fn lowercase_transforms_body() {
        let (_dir, ctx) = context("lowercase");
        let action = lowercase().unwrap();
        let result = action
            .run(ActionInput::new(vec![md_doc("Hello WORLD")]), &ctx)
            .unwrap();
        assert_eq!(result.items[0].body.as_deref(), Some("hello world"));
    }

    #[test]
    fn strip_html_errors_when_nothing_left() {
        let (_dir, ctx) = context("strip_html");
        let action = strip_html().unwrap();

        let result = action
            .run(ActionInput::new(vec![md_doc("<p>Keep me</p>")]), &ctx)
            .unwrap();
        assert_eq!(result.items[0].body.as_deref().map(str::trim), Some("Keep me"));

        let err = action
            .run(ActionInput::new(vec![md_doc("<br/><hr/>")]), &ctx)
            .unwrap_err();
        assert!(matches!(err, KashError::ContentError(_)));
    }

    #[test]
    fn list_format_normalizes_bullets() {
        let (_dir, ctx) = context("list_format");
        let action = list_format().unwrap();
        let result = action
            .run(
                ActionInput::new(vec![md_doc("* one\n+ two\n- three\n  * nested")]),
                &ctx,
            )
            .unwrap();
        assert_eq!(
            result.items[0].body.as_deref(),
            Some("- one\n- two\n- three\n  - nested")
        );
    }

    #[test]
    fn copy_item_keeps_type_and_links_parent() {
        let (_dir, ctx) = context("copy_item");
        let action = copy_item().unwrap();
        let mut input = md_doc("body");
        input.store_path = Some(kash_core::paths::StorePath::parse("docs/d.doc.md").unwrap());

        let result = action.run(ActionInput::new(vec![input]), &ctx).unwrap();
        let out = &result.items[0];
        assert_eq!(out.item_type, ItemType::Doc);
        assert_eq!(out.relations.derived_from, vec!["docs/d.doc.md"]);
    }
}
