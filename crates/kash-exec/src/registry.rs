// SPDX-License-Identifier: MIT OR Apache-2.0
//! The thread-safe action registry.
//!
//! Actions are registered under their name; duplicate registration logs a
//! warning and overwrites. A cached listing of all actions is invalidated
//! on every registration. The process-wide registry is a
//! [`global_registry`] singleton; tests construct their own instances.

use crate::actions::Action;
use kash_error::{KashError, Result};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

/// A registry of actions keyed by name.
#[derive(Default)]
pub struct ActionRegistry {
    actions: RwLock<HashMap<String, Arc<dyn Action>>>,
    listing_cache: RwLock<Option<Arc<Vec<Arc<dyn Action>>>>>,
}

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl ActionRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action under its name. Duplicates warn and overwrite.
    pub fn register(&self, action: Arc<dyn Action>) {
        let name = action.spec().name.clone();
        let replaced = write_lock(&self.actions).insert(name.clone(), action);
        if replaced.is_some() {
            warn!(target: "kash.exec", action = %name, "action already registered, overwriting");
        } else {
            debug!(target: "kash.exec", action = %name, "registered action");
        }
        *write_lock(&self.listing_cache) = None;
    }

    /// Look up an action by name.
    ///
    /// # Errors
    ///
    /// Returns [`KashError::InvalidInput`] for unknown names.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Action>> {
        read_lock(&self.actions)
            .get(name)
            .cloned()
            .ok_or_else(|| KashError::InvalidInput(format!("unknown action: `{name}`")))
    }

    /// Whether an action with the given name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        read_lock(&self.actions).contains_key(name)
    }

    /// Sorted names of all registered actions.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = read_lock(&self.actions).keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered actions.
    #[must_use]
    pub fn len(&self) -> usize {
        read_lock(&self.actions).len()
    }

    /// True when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        read_lock(&self.actions).is_empty()
    }

    /// All actions with default parameters, sorted by name. The listing is
    /// cached and invalidated on registration.
    #[must_use]
    pub fn all_actions(&self) -> Arc<Vec<Arc<dyn Action>>> {
        if let Some(cached) = read_lock(&self.listing_cache).as_ref() {
            return Arc::clone(cached);
        }
        let mut actions: Vec<Arc<dyn Action>> =
            read_lock(&self.actions).values().cloned().collect();
        actions.sort_by(|a, b| a.spec().name.cmp(&b.spec().name));
        let listing = Arc::new(actions);
        *write_lock(&self.listing_cache) = Some(Arc::clone(&listing));
        listing
    }

    /// Remove every registered action (used by tests and reloads).
    pub fn clear(&self) {
        write_lock(&self.actions).clear();
        *write_lock(&self.listing_cache) = None;
    }
}

/// The process-wide action registry.
pub fn global_registry() -> &'static ActionRegistry {
    static REGISTRY: OnceLock<ActionRegistry> = OnceLock::new();
    REGISTRY.get_or_init(ActionRegistry::new)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ActionBuilder, ActionResult};

    fn make_action(name: &str) -> Arc<dyn Action> {
        Arc::new(
            ActionBuilder::new(name, "test action")
                .run(|input, _| Ok(ActionResult::new(input.items)))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn register_and_get() {
        let registry = ActionRegistry::new();
        registry.register(make_action("alpha"));
        registry.register(make_action("beta"));

        assert_eq!(registry.get("alpha").unwrap().spec().name, "alpha");
        assert!(registry.contains("beta"));
        assert_eq!(registry.names(), ["alpha", "beta"]);

        let err = registry.get("missing").unwrap_err();
        assert!(matches!(err, KashError::InvalidInput(_)));
    }

    #[test]
    fn duplicate_registration_overwrites() {
        let registry = ActionRegistry::new();
        registry.register(make_action("dup"));
        registry.register(make_action("dup"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn listing_is_cached_and_invalidated() {
        let registry = ActionRegistry::new();
        registry.register(make_action("b"));
        registry.register(make_action("a"));

        let first = registry.all_actions();
        let names: Vec<&str> = first.iter().map(|a| a.spec().name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);

        // Same Arc until something registers.
        let second = registry.all_actions();
        assert!(Arc::ptr_eq(&first, &second));

        registry.register(make_action("c"));
        let third = registry.all_actions();
        assert_eq!(third.len(), 3);
    }

    #[test]
    fn clear_resets() {
        let registry = ActionRegistry::new();
        registry.register(make_action("x"));
        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.all_actions().is_empty());
    }
}
