//! # Plural Resolver
//!
//! Resolves a fragment against an ordered sequence of identifiers using a
//! pool of single resolvers, one per index.

use super::single::SingleResolver;
use crate::store::{Listener, Store};
use crate::{Data, RecordId, RelinkError};
use std::rc::Rc;

/// Resolver for a fragment over a sequence of records.
///
/// Index `i` always maps to the `i`-th pooled resolver; the pool grows and
/// shrinks at the tail only.
pub struct PluralResolver<S: Store> {
    store: Rc<S>,
    on_change: Listener,
    pool: Vec<SingleResolver<S>>,
    result: Option<Rc<[Data]>>,
}

impl<S: Store> PluralResolver<S> {
    /// Create an empty resolver.
    pub fn new(store: Rc<S>, on_change: Listener) -> Self {
        Self {
            store,
            on_change,
            pool: Vec::new(),
            result: None,
        }
    }

    /// Resolve `fragment` at every identifier of `ids`.
    ///
    /// Returns the previous slice when the length is unchanged and every
    /// element is the same handle as before. Otherwise a new slice is built
    /// whose unchanged elements keep their previous handles.
    pub fn resolve(
        &mut self,
        fragment: &S::Fragment,
        ids: &[RecordId],
    ) -> Result<Rc<[Data]>, RelinkError> {
        self.fit_pool(ids.len());

        let results = self
            .pool
            .iter_mut()
            .zip(ids)
            .map(|(resolver, id)| resolver.resolve(fragment, id))
            .collect::<Result<Vec<_>, _>>()?;

        let reusable = self.result.as_ref().filter(|previous| {
            previous.len() == results.len()
                && previous
                    .iter()
                    .zip(&results)
                    .all(|(before, after)| before.same(after))
        });

        let next = match reusable {
            Some(previous) => Rc::clone(previous),
            None => Rc::from(results),
        };
        self.result = Some(Rc::clone(&next));
        Ok(next)
    }

    fn fit_pool(&mut self, len: usize) {
        for mut stale in self.pool.drain(len.min(self.pool.len())..) {
            stale.dispose();
        }
        while self.pool.len() < len {
            self.pool.push(SingleResolver::new(
                Rc::clone(&self.store),
                Rc::clone(&self.on_change),
            ));
        }
    }

    /// Dispose every pooled resolver and forget the cached slice.
    pub fn dispose(&mut self) {
        for mut resolver in self.pool.drain(..) {
            resolver.dispose();
        }
        self.result = None;
    }

    /// Number of pooled single resolvers.
    #[must_use]
    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    /// Whether any pooled resolver saw a change since the last `resolve`.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.pool.iter().any(SingleResolver::is_dirty)
    }
}

// =============================================================================
// TESTS
// =============================================================================
