// SPDX-License-Identifier: MIT OR Apache-2.0
//! Composable boolean predicates over items.
//!
//! A [`Precondition`] is a named criterion used to filter items or qualify
//! which items may be inputs to an action. Preconditions form a closed
//! algebra under `&`, `|`, and `!`, with [`Precondition::always`] and
//! [`Precondition::never`] as identity elements.

use crate::items::Item;
use kash_error::{KashError, Result};
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};
use std::sync::Arc;

type PredicateFn = dyn Fn(&Item) -> Result<bool> + Send + Sync;

/// A named boolean predicate over items.
///
/// The underlying function may return a [`KashError::PreconditionFailure`],
/// which [`eval`](Precondition::eval) treats as `false` while
/// [`check`](Precondition::check) surfaces as an error.
#[derive(Clone)]
pub struct Precondition {
    name: String,
    func: Arc<PredicateFn>,
}

impl Precondition {
    /// Create a precondition from an infallible predicate.
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&Item) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(move |item| Ok(func(item))),
        }
    }

    /// Create a precondition from a fallible predicate.
    pub fn new_fallible(
        name: impl Into<String>,
        func: impl Fn(&Item) -> Result<bool> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// The precondition's name (an infix expression for combined ones).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluate against an item. A `PreconditionFailure` from the underlying
    /// function counts as `false`.
    #[must_use]
    pub fn eval(&self, item: &Item) -> bool {
        match (*self.func)(item) {
            Ok(v) => v,
            Err(KashError::PreconditionFailure(_)) => false,
            Err(_) => false,
        }
    }

    /// Check against an item, failing with a `PreconditionFailure` that
    /// names the precondition and the item's location.
    ///
    /// # Errors
    ///
    /// Returns [`KashError::PreconditionFailure`] when the predicate is
    /// false for the item.
    pub fn check(&self, item: &Item, info: Option<&str>) -> Result<()> {
        if self.eval(item) {
            Ok(())
        } else {
            let for_info = info.map(|i| format!(" for {i}")).unwrap_or_default();
            Err(KashError::PreconditionFailure(format!(
                "precondition{for_info} not satisfied: {self} is false for {}",
                item.fmt_loc()
            )))
        }
    }

    /// The precondition that accepts every item.
    #[must_use]
    pub fn always() -> Self {
        Self::new("always", |_| true)
    }

    /// The precondition that rejects every item.
    #[must_use]
    pub fn never() -> Self {
        Self::new("never", |_| false)
    }

    /// Fold with `&`; the empty fold is [`always`](Self::always).
    #[must_use]
    pub fn and_all(preconditions: impl IntoIterator<Item = Precondition>) -> Self {
        let mut iter = preconditions.into_iter();
        match iter.next() {
            None => Self::always(),
            Some(first) => iter.fold(first, |acc, p| acc & p),
        }
    }

    /// Fold with `|`; the empty fold is [`never`](Self::never).
    #[must_use]
    pub fn or_all(preconditions: impl IntoIterator<Item = Precondition>) -> Self {
        let mut iter = preconditions.into_iter();
        match iter.next() {
            None => Self::never(),
            Some(first) => iter.fold(first, |acc, p| acc | p),
        }
    }
}

impl BitAnd for Precondition {
    type Output = Precondition;

    fn bitand(self, other: Precondition) -> Precondition {
        let name = format!("{} & {}", self.name, other.name);
        let (a, b) = (self.func, other.func);
        Precondition {
            name,
            func: Arc::new(move |item| {
                Ok(matches!((*a)(item), Ok(true)) && matches!((*b)(item), Ok(true)))
            }),
        }
    }
}

impl BitOr for Precondition {
    type Output = Precondition;

    fn bitor(self, other: Precondition) -> Precondition {
        let name = format!("{} | {}", self.name, other.name);
        let (a, b) = (self.func, other.func);
        Precondition {
            name,
            func: Arc::new(move |item| {
                Ok(matches!((*a)(item), Ok(true)) || matches!((*b)(item), Ok(true)))
            }),
        }
    }
}

impl Not for Precondition {
    type Output = Precondition;

    fn not(self) -> Precondition {
        let name = format!("~{}", self.name);
        let f = self.func;
        Precondition {
            name,
            func: Arc::new(move |item| Ok(!matches!((*f)(item), Ok(true)))),
        }
    }
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}`", self.name)
    }
}

impl fmt::Debug for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Precondition")
            .field("name", &self.name)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
