//! # Change Emitter
//!
//! Registry of change listeners, each scoped to a set of record identifiers.
//!
//! The store calls `notify` once per committed batch. A listener fires at
//! most once per batch, no matter how many of its identifiers changed.

use crate::store::{Listener, Subscription};
use crate::RecordId;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

#[derive(Default)]
struct Registry {
    next_token: u64,
    entries: BTreeMap<u64, (BTreeSet<RecordId>, Listener)>,
}

/// Dispatches record changes to the listeners that asked for them.
#[derive(Clone, Default)]
pub struct ChangeEmitter {
    registry: Rc<RefCell<Registry>>,
}

impl ChangeEmitter {
    /// Create an emitter with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for changes to any of `ids`.
    pub fn subscribe(&self, ids: &BTreeSet<RecordId>, listener: Listener) -> Subscription {
        let token = {
            let mut registry = self.registry.borrow_mut();
            let token = registry.next_token;
            registry.next_token = registry.next_token.saturating_add(1);
            registry.entries.insert(token, (ids.clone(), listener));
            token
        };

        let registry = Rc::downgrade(&self.registry);
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.borrow_mut().entries.remove(&token);
            }
        })
    }

    /// Invoke every listener whose identifiers intersect `changed`.
    ///
    /// Listeners run after the registry borrow is released, so they may
    /// remove subscriptions (their own or others').
    pub fn notify(&self, changed: &BTreeSet<RecordId>) {
        if changed.is_empty() {
            return;
        }

        let hits: Vec<Listener> = self
            .registry
            .borrow()
            .entries
            .values()
            .filter(|(ids, _)| !ids.is_disjoint(changed))
            .map(|(_, listener)| Rc::clone(listener))
            .collect();

        tracing::trace!(changed = changed.len(), listeners = hits.len(), "notify");

        for listener in hits {
            listener();
        }
    }

    /// Number of live registrations.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.registry.borrow().entries.len()
    }

    /// Whether any live registration watches `id`.
    #[must_use]
    pub fn is_watched(&self, id: &RecordId) -> bool {
        self.registry
            .borrow()
            .entries
            .values()
            .any(|(ids, _)| ids.contains(id))
    }
}

impl std::fmt::Debug for ChangeEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeEmitter")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
