// SPDX-License-Identifier: MIT OR Apache-2.0
//! Slug uniquification.
//!
//! The store needs every `{slug}.{full_suffix}` filename to be unique.
//! [`Uniquifier`] tracks used slugs per suffix and hands out `_2`, `_3`, …
//! variants, remembering the prior slugs so callers can diff against the
//! previous version of a similarly named item.

use std::collections::{HashMap, HashSet};

/// Tracks used slugs per filename suffix.
#[derive(Debug, Default)]
pub struct Uniquifier {
    used: HashSet<(String, String)>,
    /// Base slug + suffix -> used slugs, most recent last.
    history: HashMap<(String, String), Vec<String>>,
}

/// Strip a trailing `_<n>` uniquifier from a slug.
fn base_of(slug: &str) -> &str {
    if let Some((base, n)) = slug.rsplit_once('_') {
        if !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()) {
            return base;
        }
    }
    slug
}

impl Uniquifier {
    /// An empty uniquifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct slug/suffix pairs seen.
    #[must_use]
    pub fn len(&self) -> usize {
        self.used.len()
    }

    /// True when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    /// Record an existing slug for a suffix (used when indexing a store).
    pub fn add(&mut self, slug: &str, full_suffix: &str) {
        let key = (slug.to_string(), full_suffix.to_string());
        if self.used.insert(key) {
            self.history
                .entry((base_of(slug).to_string(), full_suffix.to_string()))
                .or_default()
                .push(slug.to_string());
        }
    }

    /// Return a unique slug for the suffix (appending `_2`, `_3`, … as
    /// needed) and the previously used slugs for the same base slug, most
    /// recent first. The returned slug is recorded as used.
    pub fn uniquify_historic(&mut self, slug: &str, full_suffix: &str) -> (String, Vec<String>) {
        let mut prior: Vec<String> = self
            .history
            .get(&(base_of(slug).to_string(), full_suffix.to_string()))
            .cloned()
            .unwrap_or_default();
        prior.reverse();

        let unique = if !self.used.contains(&(slug.to_string(), full_suffix.to_string())) {
            slug.to_string()
        } else {
            let mut n = 2u32;
            loop {
                let candidate = format!("{slug}_{n}");
                if !self
                    .used
                    .contains(&(candidate.clone(), full_suffix.to_string()))
                {
                    break candidate;
                }
                n += 1;
            }
        };

        self.add(&unique, full_suffix);
        (unique, prior)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
