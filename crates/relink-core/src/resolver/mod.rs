//! # Resolver Module
//!
//! The entry point callers hold on to: `Resolver` inspects the shape of the
//! identifier argument on every call and routes to a singular or plural
//! delegate, swapping (and disposing) the delegate when the shape changes.
//!
//! ## Recoverable Inconsistencies
//!
//! - Resolving with a fragment whose identity differs from the construction
//!   fragment: warn, then resolve with the supplied fragment.
//! - A fragment whose declared plurality disagrees with the identifier
//!   shape: warn, then resolve by the shape of the identifiers.

pub mod plural;
pub mod single;

pub use plural::PluralResolver;
pub use single::SingleResolver;

use crate::store::{Fragment, Listener, Store};
use crate::{RelinkError, Resolved, Target};
use std::rc::Rc;

/// Kind of the active delegate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverKind {
    /// Resolving one record.
    Single,
    /// Resolving a sequence of records.
    Plural,
}

enum Delegate<S: Store> {
    Single(SingleResolver<S>),
    Plural(PluralResolver<S>),
}

impl<S: Store> Delegate<S> {
    fn kind(&self) -> ResolverKind {
        match self {
            Self::Single(_) => ResolverKind::Single,
            Self::Plural(_) => ResolverKind::Plural,
        }
    }

    fn dispose(&mut self) {
        match self {
            Self::Single(single) => single.dispose(),
            Self::Plural(plural) => plural.dispose(),
        }
    }
}

/// Top-level resolver.
///
/// ```
/// use relink_core::{FieldSelection, RecordStore, Resolver, Selection};
/// use std::rc::Rc;
///
/// let store = Rc::new(RecordStore::new());
/// store.commit(|batch| {
///     batch.set("1", "name", "Alice");
/// });
///
/// let fragment = Selection::new("UserName", vec![FieldSelection::scalar("name")]);
/// let mut resolver = Resolver::new(Rc::clone(&store), fragment.clone(), Rc::new(|| {}));
///
/// let first = resolver.resolve(&fragment, "1").expect("resolve");
/// let second = resolver.resolve(&fragment, "1").expect("resolve");
/// assert!(first.same(&second));
/// ```
pub struct Resolver<S: Store> {
    store: Rc<S>,
    fragment: S::Fragment,
    on_change: Listener,
    delegate: Option<Delegate<S>>,
}

impl<S: Store> Resolver<S> {
    /// Create a resolver for `fragment`. `on_change` fires when a result
    /// returned earlier has become stale; it must not call `resolve`.
    pub fn new(store: Rc<S>, fragment: S::Fragment, on_change: Listener) -> Self {
        Self {
            store,
            fragment,
            on_change,
            delegate: None,
        }
    }

    /// Resolve `fragment` at `target`.
    pub fn resolve(
        &mut self,
        fragment: &S::Fragment,
        target: impl Into<Target>,
    ) -> Result<Resolved, RelinkError> {
        let target = target.into();
        self.check(fragment, &target);

        match target {
            Target::One(id) => {
                let mut single = match self.delegate.take() {
                    Some(Delegate::Single(single)) => single,
                    stale => {
                        self.retire(stale, ResolverKind::Single);
                        SingleResolver::new(Rc::clone(&self.store), Rc::clone(&self.on_change))
                    }
                };
                let result = single.resolve(fragment, &id);
                self.delegate = Some(Delegate::Single(single));
                result.map(Resolved::One)
            }
            Target::Many(ids) => {
                let mut plural = match self.delegate.take() {
                    Some(Delegate::Plural(plural)) => plural,
                    stale => {
                        self.retire(stale, ResolverKind::Plural);
                        PluralResolver::new(Rc::clone(&self.store), Rc::clone(&self.on_change))
                    }
                };
                let result = plural.resolve(fragment, &ids);
                self.delegate = Some(Delegate::Plural(plural));
                result.map(Resolved::Many)
            }
        }
    }

    fn check(&self, fragment: &S::Fragment, target: &Target) {
        if fragment.concrete_identity() != self.fragment.concrete_identity() {
            tracing::warn!(
                fragment = fragment.debug_name(),
                expected = self.fragment.concrete_identity(),
                actual = fragment.concrete_identity(),
                "resolving a fragment other than the one this resolver was created for"
            );
        }
        if fragment.is_plural() != target.is_plural() {
            tracing::warn!(
                fragment = fragment.debug_name(),
                declared_plural = fragment.is_plural(),
                plural_ids = target.is_plural(),
                "fragment plurality does not match the identifiers; following the identifiers"
            );
        }
    }

    fn retire(&self, stale: Option<Delegate<S>>, next: ResolverKind) {
        if let Some(mut stale) = stale {
            tracing::debug!(
                fragment = self.fragment.debug_name(),
                from = ?stale.kind(),
                to = ?next,
                "swapping delegate"
            );
            stale.dispose();
        }
    }

    /// Dispose the active delegate. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if let Some(mut delegate) = self.delegate.take() {
            delegate.dispose();
        }
    }

    /// Kind of the active delegate, if any.
    #[must_use]
    pub fn kind(&self) -> Option<ResolverKind> {
        self.delegate.as_ref().map(Delegate::kind)
    }

    /// The fragment this resolver was created with.
    #[must_use]
    pub fn fragment(&self) -> &S::Fragment {
        &self.fragment
    }

    /// Whether a change arrived since the last `resolve`.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        match &self.delegate {
            Some(Delegate::Single(single)) => single.is_dirty(),
            Some(Delegate::Plural(plural)) => plural.is_dirty(),
            None => false,
        }
    }
}

impl<S: Store> Drop for Resolver<S> {
    fn drop(&mut self) {
        self.dispose();
    }
}

// =============================================================================
// TESTS
// =============================================================================
