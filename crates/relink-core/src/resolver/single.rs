//! # Single Resolver
//!
//! Resolves one fragment against one record identifier, reusing or
//! recycling the previous result whenever it can, and keeps exactly one
//! change subscription scoped to the records the last read touched.
//!
//! ## State
//!
//! ```text
//! EMPTY --resolve--> BOUND
//! BOUND --resolve (same canonical target, nothing changed)--> BOUND (same result)
//! BOUND --resolve (same canonical target, changed)---------> BOUND (recycled result)
//! BOUND --resolve (different canonical target)-------------> BOUND (fresh result)
//! any   --dispose--> EMPTY
//! ```

use crate::recycle::recycle;
use crate::store::{Fragment, Listener, Store, Subscription};
use crate::{Data, RecordId, RelinkError};
use std::cell::Cell;
use std::collections::BTreeSet;
use std::rc::Rc;

// =============================================================================
// CHANGE SIGNAL
// =============================================================================

/// One-shot dirty bit shared between a resolver and its change listener.
struct ChangeSignal {
    dirty: Cell<bool>,
    on_change: Listener,
}

impl ChangeSignal {
    /// Mark dirty and forward to the owner, once per dirty period.
    fn fire(&self) {
        if !self.dirty.replace(true) {
            (self.on_change)();
        }
    }
}

/// The live subscription and the identifiers it covers.
struct Watch {
    subscription: Subscription,
    /// Cleared on removal; a listener captured by an in-flight notification
    /// must not fire once its subscription is gone.
    armed: Rc<Cell<bool>>,
    ids: BTreeSet<RecordId>,
}

impl Watch {
    fn remove(self) -> BTreeSet<RecordId> {
        self.armed.set(false);
        self.subscription.remove();
        self.ids
    }
}

/// Cached `(fragment, identifier, result)` triple of a bound resolver.
struct Bound<F> {
    fragment: F,
    id: RecordId,
    result: Data,
    watch: Option<Watch>,
}

enum Resolution {
    Reuse(Data),
    /// `fresh` is set for the first read and for a new canonical target;
    /// the previous subscription never carries over to those.
    Read {
        data: Data,
        touched: BTreeSet<RecordId>,
        fresh: bool,
    },
}

// =============================================================================
// SINGLE RESOLVER
// =============================================================================

/// Resolver for a fragment rooted at a single record.
pub struct SingleResolver<S: Store> {
    store: Rc<S>,
    signal: Rc<ChangeSignal>,
    state: Option<Bound<S::Fragment>>,
}

impl<S: Store> SingleResolver<S> {
    /// Create an empty resolver. `on_change` fires when a previously
    /// returned result becomes stale.
    pub fn new(store: Rc<S>, on_change: Listener) -> Self {
        Self {
            store,
            signal: Rc::new(ChangeSignal {
                dirty: Cell::new(false),
                on_change,
            }),
            state: None,
        }
    }

    /// Resolve `fragment` at `id`.
    ///
    /// Returns the previous result handle when nothing changed, a recycled
    /// tree when the same canonical record was re-read, and a fresh tree
    /// otherwise. Store failures are propagated and leave the resolver in
    /// its previous state.
    pub fn resolve(&mut self, fragment: &S::Fragment, id: &RecordId) -> Result<Data, RelinkError> {
        let resolution = self.plan(fragment, id)?;
        let previous = self.state.take();

        let (data, touched, fresh) = match resolution {
            Resolution::Reuse(data) => (data, None, false),
            Resolution::Read {
                data,
                touched,
                fresh,
            } => (data, Some(touched), fresh),
        };

        let changed = fresh
            || previous
                .as_ref()
                .is_none_or(|bound| !bound.result.same(&data));

        let watch = if changed {
            let stale = previous.and_then(|bound| bound.watch);
            self.rewatch(id, touched, stale)?
        } else {
            previous.and_then(|bound| bound.watch)
        };

        self.state = Some(Bound {
            fragment: fragment.clone(),
            id: id.clone(),
            result: data.clone(),
            watch,
        });
        self.signal.dirty.set(false);
        Ok(data)
    }

    /// Decide between reusing, recycling and reading fresh.
    fn plan(&self, fragment: &S::Fragment, id: &RecordId) -> Result<Resolution, RelinkError> {
        let Some(bound) = &self.state else {
            return self.read_fresh(fragment, id);
        };

        if self.store.canonicalize(&bound.id) != self.store.canonicalize(id) {
            return self.read_fresh(fragment, id);
        }

        let dirty = self.signal.dirty.get();
        if bound.id == *id && !dirty && bound.fragment.is_equivalent(fragment) {
            tracing::trace!(fragment = fragment.debug_name(), record = %id, "reuse");
            return Ok(Resolution::Reuse(bound.result.clone()));
        }

        tracing::debug!(
            fragment = fragment.debug_name(),
            record = %id,
            dirty,
            "re-read"
        );
        let outcome = self.store.read(fragment, id)?;
        Ok(Resolution::Read {
            data: recycle(&bound.result, outcome.data),
            touched: outcome.touched,
            fresh: false,
        })
    }

    fn read_fresh(&self, fragment: &S::Fragment, id: &RecordId) -> Result<Resolution, RelinkError> {
        tracing::debug!(fragment = fragment.debug_name(), record = %id, "read");
        let outcome = self.store.read(fragment, id)?;
        Ok(Resolution::Read {
            data: outcome.data,
            touched: outcome.touched,
            fresh: true,
        })
    }

    /// Replace the subscription and settle reference counts.
    ///
    /// Counts for the new set are incremented before the old set is
    /// decremented, including identifiers present in both.
    fn rewatch(
        &self,
        root: &RecordId,
        touched: Option<BTreeSet<RecordId>>,
        stale: Option<Watch>,
    ) -> Result<Option<Watch>, RelinkError> {
        let released = stale.map(Watch::remove);

        let watch = match touched {
            Some(mut ids) => {
                ids.insert(root.clone());
                let armed = Rc::new(Cell::new(true));
                match self.store.subscribe(&ids, self.listener(&armed)) {
                    Ok(subscription) => Some(Watch {
                        subscription,
                        armed,
                        ids,
                    }),
                    Err(e) => {
                        self.settle(None, released.as_ref());
                        return Err(e);
                    }
                }
            }
            None => None,
        };

        self.settle(watch.as_ref().map(|w| &w.ids), released.as_ref());
        Ok(watch)
    }

    fn listener(&self, armed: &Rc<Cell<bool>>) -> Listener {
        let signal = Rc::downgrade(&self.signal);
        let armed = Rc::clone(armed);
        Rc::new(move || {
            if !armed.get() {
                return;
            }
            if let Some(signal) = signal.upgrade() {
                signal.fire();
            }
        })
    }

    fn settle(&self, next: Option<&BTreeSet<RecordId>>, prev: Option<&BTreeSet<RecordId>>) {
        let Some(collector) = self.store.collector() else {
            return;
        };
        for id in next.into_iter().flatten() {
            collector.increment(&self.store.canonicalize(id));
        }
        for id in prev.into_iter().flatten() {
            collector.decrement(&self.store.canonicalize(id));
        }
    }

    /// Release the subscription and reference counts and return to EMPTY.
    ///
    /// Safe to call repeatedly and before any `resolve`.
    pub fn dispose(&mut self) {
        if let Some(bound) = self.state.take() {
            let released = bound.watch.map(Watch::remove);
            self.settle(None, released.as_ref());
        }
        self.signal.dirty.set(false);
    }

    /// Whether a change arrived since the last `resolve`.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.signal.dirty.get()
    }

    /// Whether the resolver holds a cached result.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.state.is_some()
    }

    /// The cached result, if any.
    #[must_use]
    pub fn result(&self) -> Option<&Data> {
        self.state.as_ref().map(|bound| &bound.result)
    }

    /// Identifiers covered by the current subscription.
    #[must_use]
    pub fn subscribed_ids(&self) -> Option<&BTreeSet<RecordId>> {
        self.state
            .as_ref()
            .and_then(|bound| bound.watch.as_ref())
            .map(|watch| &watch.ids)
    }
}

impl<S: Store> Drop for SingleResolver<S> {
    fn drop(&mut self) {
        self.dispose();
    }
}

// =============================================================================
// TESTS
// =============================================================================
