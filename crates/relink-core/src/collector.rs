//! # Reference Collector
//!
//! Counts interested parties per canonical record identifier.
//!
//! A collector built with [`RefCountCollector::with_journal`] also records
//! every call in order, so tests can check that a sequence of operations
//! nets to zero and observe the intermediate counts a collector would see
//! if it snapshotted mid-update. The journal grows with every call until
//! drained with [`RefCountCollector::take_journal`].

use crate::RecordId;
use crate::store::ReferenceCollector;
use std::cell::RefCell;
use std::collections::BTreeMap;

/// A single bookkeeping call, in the order it was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectorOp {
    /// `increment(id)` was called.
    Increment(RecordId),
    /// `decrement(id)` was called.
    Decrement(RecordId),
}

#[derive(Debug, Default)]
struct Counts {
    counts: BTreeMap<RecordId, u64>,
    journal: Option<Vec<CollectorOp>>,
}

/// Reference-counting collector.
///
/// Identifiers stay tracked after their count drops to zero; `released_ids`
/// lists them so a store can sweep the records nobody needs anymore.
#[derive(Debug, Default)]
pub struct RefCountCollector {
    inner: RefCell<Counts>,
}

impl RefCountCollector {
    /// Create an empty collector without a journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty collector that journals every call.
    #[must_use]
    pub fn with_journal() -> Self {
        Self {
            inner: RefCell::new(Counts {
                counts: BTreeMap::new(),
                journal: Some(Vec::new()),
            }),
        }
    }

    /// Current count for `id` (zero if never tracked).
    #[must_use]
    pub fn count(&self, id: &RecordId) -> u64 {
        self.inner.borrow().counts.get(id).copied().unwrap_or(0)
    }

    /// Identifiers with a positive count, in order.
    #[must_use]
    pub fn live_ids(&self) -> Vec<RecordId> {
        self.inner
            .borrow()
            .counts
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Identifiers that were tracked and are now at zero.
    #[must_use]
    pub fn released_ids(&self) -> Vec<RecordId> {
        self.inner
            .borrow()
            .counts
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Stop tracking `id`.
    pub fn forget(&self, id: &RecordId) {
        self.inner.borrow_mut().counts.remove(id);
    }

    /// Journaled calls since the last drain, oldest first. Empty when the
    /// collector was built without a journal.
    #[must_use]
    pub fn journal(&self) -> Vec<CollectorOp> {
        self.inner.borrow().journal.clone().unwrap_or_default()
    }

    /// Drain the journal, keeping journaling enabled.
    pub fn take_journal(&self) -> Vec<CollectorOp> {
        self.inner
            .borrow_mut()
            .journal
            .as_mut()
            .map(std::mem::take)
            .unwrap_or_default()
    }

    /// Net increments minus decrements per identifier, replayed from the
    /// journal since the last drain.
    #[must_use]
    pub fn net_by_id(&self) -> BTreeMap<RecordId, i64> {
        let mut net = BTreeMap::new();
        for op in self.inner.borrow().journal.iter().flatten() {
            match op {
                CollectorOp::Increment(id) => *net.entry(id.clone()).or_insert(0) += 1,
                CollectorOp::Decrement(id) => *net.entry(id.clone()).or_insert(0) -= 1,
            }
        }
        net
    }
}

impl ReferenceCollector for RefCountCollector {
    fn increment(&self, id: &RecordId) {
        let mut inner = self.inner.borrow_mut();
        let count = inner.counts.entry(id.clone()).or_insert(0);
        *count = count.saturating_add(1);
        if let Some(journal) = inner.journal.as_mut() {
            journal.push(CollectorOp::Increment(id.clone()));
        }
    }

    fn decrement(&self, id: &RecordId) {
        let mut inner = self.inner.borrow_mut();
        let count = inner.counts.entry(id.clone()).or_insert(0);
        if *count == 0 {
            tracing::warn!(record = %id, "reference count decremented below zero");
        }
        *count = count.saturating_sub(1);
        if let Some(journal) = inner.journal.as_mut() {
            journal.push(CollectorOp::Decrement(id.clone()));
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
