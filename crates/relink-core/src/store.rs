//! # Store Collaborators
//!
//! The interfaces the resolvers consume from the surrounding system:
//! - `Fragment`: the capability contract of a query shape
//! - `Store`: read routine, canonicalization, change subscription, collector
//! - `ReferenceCollector`: liveness bookkeeping keyed by canonical identifier
//! - `Subscription`: an owned change-emitter registration
//!
//! The resolvers never mutate the store; they only read from it and register
//! interest in the records they read.

use crate::{Data, RecordId, RelinkError};
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

// =============================================================================
// FRAGMENT TRAIT
// =============================================================================

/// Capability contract of a fragment (a declarative query shape).
///
/// Fragments are immutable and owned by the caller.
pub trait Fragment: fmt::Debug {
    /// Identity token, stable across structurally-equivalent instances.
    fn concrete_identity(&self) -> &str;

    /// Whether the fragment declares a plural (sequence) selection.
    fn is_plural(&self) -> bool;

    /// Human-readable name for diagnostics.
    fn debug_name(&self) -> &str;

    /// True iff reading `self` and `other` at the same record yields the
    /// same read behavior (same selection and same runtime parameters).
    fn is_equivalent(&self, other: &Self) -> bool;
}

// =============================================================================
// READ OUTCOME
// =============================================================================

/// Result of the store's read routine.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOutcome {
    /// The materialized data.
    pub data: Data,
    /// Every record identifier touched during the read.
    pub touched: BTreeSet<RecordId>,
}

impl ReadOutcome {
    /// Create a new read outcome.
    #[must_use]
    pub fn new(data: Data, touched: BTreeSet<RecordId>) -> Self {
        Self { data, touched }
    }
}

// =============================================================================
// SUBSCRIPTION
// =============================================================================

/// Change listener registered with a store.
pub type Listener = Rc<dyn Fn()>;

/// An owned registration with a change emitter.
///
/// `remove` unregisters the listener. A handle dropped without `remove`
/// unregisters as well.
pub struct Subscription {
    release: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Wrap the emitter-specific release action.
    pub fn new(release: impl FnOnce() + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Unregister the listener.
    pub fn remove(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

// =============================================================================
// REFERENCE COLLECTOR TRAIT
// =============================================================================

/// Liveness bookkeeping keyed by canonical record identifier.
///
/// Methods take `&self`: the collector is shared process-wide state and
/// keeps its counts behind interior mutability.
pub trait ReferenceCollector {
    /// Register one more interested party for `id`.
    fn increment(&self, id: &RecordId);

    /// Release one interested party for `id`.
    fn decrement(&self, id: &RecordId);
}

// =============================================================================
// STORE TRAIT
// =============================================================================

/// The normalized record store as seen by the resolvers.
pub trait Store {
    /// The fragment type this store knows how to read.
    type Fragment: Fragment + Clone;

    /// Read `fragment` rooted at `id`, reporting every record touched.
    fn read(&self, fragment: &Self::Fragment, id: &RecordId) -> Result<ReadOutcome, RelinkError>;

    /// Map a view identifier to the identifier of its underlying collection.
    ///
    /// Identity for non-view identifiers; idempotent.
    fn canonicalize(&self, id: &RecordId) -> RecordId;

    /// Register `listener` for changes to any record in `ids`.
    fn subscribe(
        &self,
        ids: &BTreeSet<RecordId>,
        listener: Listener,
    ) -> Result<Subscription, RelinkError>;

    /// The reference collector, if the store has one.
    fn collector(&self) -> Option<&dyn ReferenceCollector>;
}

// =============================================================================
// TESTS
// =============================================================================
