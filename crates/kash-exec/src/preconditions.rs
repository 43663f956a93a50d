// SPDX-License-Identifier: MIT OR Apache-2.0
//! Named precondition definitions and their registry.
//!
//! The standard predicates actions declare over items. Each is a plain
//! function returning a fresh [`Precondition`]; the registry keeps them by
//! name so tooling can list and look them up.

use kash_core::formats::Format;
use kash_core::items::{Item, ItemType};
use kash_core::preconditions::Precondition;
use std::collections::BTreeMap;
use std::sync::{OnceLock, RwLock};
use tracing::warn;

/// The item is a resource.
#[must_use]
pub fn is_resource() -> Precondition {
    Precondition::new("is_resource", |item: &Item| {
        item.item_type == ItemType::Resource
    })
}

/// The item is a concept.
#[must_use]
pub fn is_concept() -> Precondition {
    Precondition::new("is_concept", |item: &Item| {
        item.item_type == ItemType::Concept
    })
}

/// The item is a config.
#[must_use]
pub fn is_config() -> Precondition {
    Precondition::new("is_config", |item: &Item| item.item_type == ItemType::Config)
}

/// The item is a chat.
#[must_use]
pub fn is_chat() -> Precondition {
    Precondition::new("is_chat", |item: &Item| item.item_type == ItemType::Chat)
}

/// The item is a doc.
#[must_use]
pub fn is_doc() -> Precondition {
    Precondition::new("is_doc", |item: &Item| item.item_type == ItemType::Doc)
}

/// The item is a URL resource.
#[must_use]
pub fn is_url_item() -> Precondition {
    Precondition::new("is_url_item", |item: &Item| {
        item.item_type == ItemType::Resource && item.url.is_some()
    })
}

/// The item is an audio resource.
#[must_use]
pub fn is_audio_resource() -> Precondition {
    Precondition::new("is_audio_resource", |item: &Item| {
        item.item_type == ItemType::Resource && item.format.is_some_and(|f| f.is_audio())
    })
}

/// The item is a video resource.
#[must_use]
pub fn is_video_resource() -> Precondition {
    Precondition::new("is_video_resource", |item: &Item| {
        item.item_type == ItemType::Resource && item.format.is_some_and(|f| f.is_video())
    })
}

/// The item has a non-blank body.
#[must_use]
pub fn has_body() -> Precondition {
    Precondition::new("has_body", |item: &Item| {
        item.body.as_deref().is_some_and(|b| !b.trim().is_empty())
    })
}

/// The item has a plaintext or Markdown body.
#[must_use]
pub fn has_text_body() -> Precondition {
    Precondition::new("has_text_body", |item: &Item| {
        item.body.as_deref().is_some_and(|b| !b.trim().is_empty())
            && matches!(
                item.format,
                Some(Format::Plaintext | Format::Markdown | Format::MdHtml)
            )
    })
}

/// The item has an HTML-bearing body.
#[must_use]
pub fn has_html_body() -> Precondition {
    Precondition::new("has_html_body", |item: &Item| {
        item.body.as_deref().is_some_and(|b| !b.trim().is_empty())
            && matches!(item.format, Some(Format::Html | Format::MdHtml))
    })
}

/// The item is plaintext with a body.
#[must_use]
pub fn is_plaintext() -> Precondition {
    Precondition::new("is_plaintext", |item: &Item| {
        item.body.as_deref().is_some_and(|b| !b.trim().is_empty())
            && item.format == Some(Format::Plaintext)
    })
}

/// The item is Markdown with a body.
#[must_use]
pub fn is_markdown() -> Precondition {
    Precondition::new("is_markdown", |item: &Item| {
        item.body.as_deref().is_some_and(|b| !b.trim().is_empty())
            && matches!(item.format, Some(Format::Markdown | Format::MdHtml))
    })
}

/// The item is HTML with a body.
#[must_use]
pub fn is_html() -> Precondition {
    Precondition::new("is_html", |item: &Item| {
        item.body.as_deref().is_some_and(|b| !b.trim().is_empty())
            && item.format == Some(Format::Html)
    })
}

/// A document processable by LLMs and plaintext tools.
#[must_use]
pub fn is_text_doc() -> Precondition {
    Precondition::new("is_text_doc", |item: &Item| {
        item.body.as_deref().is_some_and(|b| !b.trim().is_empty())
            && matches!(
                item.format,
                Some(Format::Plaintext | Format::Markdown | Format::MdHtml)
            )
    })
}

/// The body contains fenced code blocks.
#[must_use]
pub fn contains_fenced_code() -> Precondition {
    Precondition::new("contains_fenced_code", |item: &Item| {
        item.body
            .as_deref()
            .is_some_and(|b| b.lines().any(|l| l.trim_start().starts_with("```")))
    })
}

/// The body has more than a handful of paragraphs.
#[must_use]
pub fn has_many_paragraphs() -> Precondition {
    Precondition::new("has_many_paragraphs", |item: &Item| {
        item.body.as_deref().is_some_and(|b| b.matches("\n\n").count() > 4)
    })
}

/// The item has a thumbnail URL.
#[must_use]
pub fn has_thumbnail_url() -> Precondition {
    Precondition::new("has_thumbnail_url", |item: &Item| {
        item.thumbnail_url.is_some()
    })
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// A registry of named preconditions.
#[derive(Default)]
pub struct PreconditionRegistry {
    preconditions: RwLock<BTreeMap<String, Precondition>>,
}

impl PreconditionRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a precondition under its own name. Duplicates warn and
    /// overwrite.
    pub fn register(&self, precondition: Precondition) {
        let mut map = match self.preconditions.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if map
            .insert(precondition.name().to_string(), precondition.clone())
            .is_some()
        {
            warn!(
                target: "kash.exec",
                precondition = precondition.name(),
                "precondition already registered, overwriting"
            );
        }
    }

    /// Look up a precondition by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Precondition> {
        match self.preconditions.read() {
            Ok(guard) => guard.get(name).cloned(),
            Err(poisoned) => poisoned.into_inner().get(name).cloned(),
        }
    }

    /// Sorted names of all registered preconditions.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        match self.preconditions.read() {
            Ok(guard) => guard.keys().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().keys().cloned().collect(),
        }
    }
}

/// The process-wide precondition registry, preloaded with the standard
/// predicates.
pub fn global_preconditions() -> &'static PreconditionRegistry {
    static REGISTRY: OnceLock<PreconditionRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let registry = PreconditionRegistry::new();
        for p in standard_preconditions() {
            registry.register(p);
        }
        registry
    })
}

/// All the standard precondition definitions.
#[must_use]
pub fn standard_preconditions() -> Vec<Precondition> {
    vec![
        is_resource(),
        is_concept(),
        is_config(),
        is_chat(),
        is_doc(),
        is_url_item(),
        is_audio_resource(),
        is_video_resource(),
        has_body(),
        has_text_body(),
        has_html_body(),
        is_plaintext(),
        is_markdown(),
        is_html(),
        is_text_doc(),
        contains_fenced_code(),
        has_many_paragraphs(),
        has_thumbnail_url(),
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn md_doc(body: &str) -> Item {
        let mut item = Item::new(ItemType::Doc);
        item.format = Some(Format::Markdown);
        item.body = Some(body.into());
        item
    }

    #[test]
    fn type_predicates() {
        let doc = md_doc("x");
        assert!(is_doc().eval(&doc));
        assert!(!is_resource().eval(&doc));

        let resource = Item::from_url("https://example.com");
        assert!(is_resource().eval(&resource));
        assert!(is_url_item().eval(&resource));
        assert!(!is_url_item().eval(&doc));
    }

    #[test]
    fn body_predicates() {
        assert!(has_body().eval(&md_doc("text")));
        assert!(!has_body().eval(&md_doc("   ")));
        assert!(is_markdown().eval(&md_doc("text")));
        assert!(is_text_doc().eval(&md_doc("text")));
        assert!(!is_html().eval(&md_doc("text")));

        let mut html = md_doc("<p>x</p>");
        html.format = Some(Format::Html);
        assert!(is_html().eval(&html));
        assert!(has_html_body().eval(&html));
        assert!(!is_markdown().eval(&html));
    }

    #[test]
    fn content_predicates() {
        assert!(contains_fenced_code().eval(&md_doc("```rust\nfn x(){}\n```")));
        assert!(!contains_fenced_code().eval(&md_doc("plain")));

        let many = "p\n\n".repeat(6);
        assert!(has_many_paragraphs().eval(&md_doc(&many)));
        assert!(!has_many_paragraphs().eval(&md_doc("one\n\ntwo")));
    }

    #[test]
    fn combined_predicates_evaluate() {
        let p = is_doc() & has_body();
        assert_eq!(p.name(), "is_doc & has_body");
        assert!(p.eval(&md_doc("text")));
        assert!(!p.eval(&Item::from_url("https://example.com")));
    }

    #[test]
    fn registry_holds_standard_set() {
        let registry = global_preconditions();
        assert!(registry.get("is_doc").is_some());
        assert!(registry.get("has_body").is_some());
        assert!(registry.get("no_such").is_none());
        assert!(registry.names().len() >= 18);
    }
}
