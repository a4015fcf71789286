//! # Scenario Replay
//!
//! Runs a [`Scenario`] against a `RecordStore` wired to a
//! `RefCountCollector`. Each named resolver slot keeps its last result so
//! every resolve step can be classified as `unchanged`, `recycled` or `fresh`.

use crate::scenario::{Scenario, Step, target_of};
use relink_core::{
    Data, RecordId, RecordStore, RefCountCollector, RelinkError, Resolved, Resolver, Selection,
    Target,
};
use serde::Serialize;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;

// =============================================================================
// REPORT TYPES
// =============================================================================

/// How a result relates to the previous result of the same resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Identity {
    /// The exact same reference as last time.
    Unchanged,
    /// A new reference that shares at least one subtree with the last one.
    Recycled,
    /// Nothing shared.
    Fresh,
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unchanged => write!(f, "unchanged"),
            Self::Recycled => write!(f, "recycled"),
            Self::Fresh => write!(f, "fresh"),
        }
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolver: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Data>,
    /// Records changed by a commit or removed by a sweep.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub records: Vec<RecordId>,
    /// Resolver slots whose change callback fired during this step.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notified: Vec<String>,
}

impl StepReport {
    fn new(index: usize, action: &'static str) -> Self {
        Self {
            index,
            action,
            resolver: None,
            identity: None,
            result: None,
            records: Vec::new(),
            notified: Vec::new(),
        }
    }
}

/// State of the world after the last step.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    /// Change callbacks received per resolver slot.
    pub callbacks: BTreeMap<String, u64>,
    /// Records with a positive reference count.
    pub live: BTreeMap<RecordId, u64>,
    /// Active store subscriptions.
    pub listeners: usize,
    /// Records left in the store.
    pub records: usize,
}

/// Full replay output.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub steps: Vec<StepReport>,
    pub summary: Summary,
}

// =============================================================================
// REPLAY
// =============================================================================

struct Slot {
    resolver: Resolver<RecordStore>,
    callbacks: Rc<Cell<u64>>,
    last: Option<Data>,
}

/// A scenario being replayed.
pub struct Replay {
    store: Rc<RecordStore>,
    collector: Rc<RefCountCollector>,
    fragments: BTreeMap<String, Selection>,
    slots: BTreeMap<String, Slot>,
}

impl Replay {
    /// Validate `scenario` and build its store.
    pub fn new(scenario: &Scenario) -> Result<Self, RelinkError> {
        scenario.validate()?;
        let (store, collector) = scenario.build_store();
        Ok(Self {
            store,
            collector,
            fragments: scenario.selections()?,
            slots: BTreeMap::new(),
        })
    }

    /// Replay every step of `scenario`. The summary is taken before the
    /// remaining resolvers are dropped.
    pub fn run(scenario: &Scenario) -> Result<ReplayReport, RelinkError> {
        let mut replay = Self::new(scenario)?;
        let steps = scenario
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| replay.step(index, step))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ReplayReport {
            steps,
            summary: replay.summary(),
        })
    }

    /// Apply a single step.
    pub fn step(&mut self, index: usize, step: &Step) -> Result<StepReport, RelinkError> {
        tracing::debug!(index, action = step.action(), "step");
        let before = self.callback_counts();

        let mut report = match step {
            Step::Resolve {
                resolver,
                fragment,
                id,
                ids,
            } => {
                let target = target_of(id.as_ref(), ids.as_ref())?;
                let mut report = self.resolve(resolver, fragment, target)?;
                report.index = index;
                report
            }
            Step::Commit { put, set, remove } => {
                let changed = self.store.commit(|batch| {
                    for (id, record) in put {
                        batch.put(id.clone(), record.clone());
                    }
                    for op in set {
                        batch.set_field(op.id.clone(), op.field.clone(), op.value.clone());
                    }
                    for id in remove {
                        batch.remove(id.clone());
                    }
                });
                let mut report = StepReport::new(index, step.action());
                report.records = changed.into_iter().collect();
                report
            }
            Step::Dispose { resolver } => {
                let slot = self.slots.get_mut(resolver).ok_or_else(|| {
                    RelinkError::Scenario(format!("unknown resolver '{}'", resolver))
                })?;
                slot.resolver.dispose();
                slot.last = None;
                let mut report = StepReport::new(index, step.action());
                report.resolver = Some(resolver.clone());
                report
            }
            Step::Sweep => {
                let mut report = StepReport::new(index, step.action());
                report.records = self.store.sweep();
                report
            }
        };

        report.notified = self
            .callback_counts()
            .into_iter()
            .filter(|(name, count)| before.get(name).copied().unwrap_or(0) < *count)
            .map(|(name, _)| name)
            .collect();
        Ok(report)
    }

    /// Resolve `fragment` at `target` with the resolver in slot `name`,
    /// creating the slot on first use.
    pub fn resolve(
        &mut self,
        name: &str,
        fragment: &str,
        target: Target,
    ) -> Result<StepReport, RelinkError> {
        let selection = self
            .fragments
            .get(fragment)
            .ok_or_else(|| RelinkError::Scenario(format!("unknown fragment '{}'", fragment)))?;

        let slot = self.slots.entry(name.to_string()).or_insert_with(|| {
            let callbacks = Rc::new(Cell::new(0u64));
            let counter = Rc::clone(&callbacks);
            let label = name.to_string();
            let on_change = Rc::new(move || {
                counter.set(counter.get().saturating_add(1));
                tracing::info!(resolver = %label, "result is stale");
            });
            Slot {
                resolver: Resolver::new(Rc::clone(&self.store), selection.clone(), on_change),
                callbacks,
                last: None,
            }
        });

        let data = match slot.resolver.resolve(selection, target)? {
            Resolved::One(data) => data,
            Resolved::Many(items) => Data::List(items),
        };
        let identity = classify(slot.last.as_ref(), &data);
        slot.last = Some(data.clone());

        let mut report = StepReport::new(0, "resolve");
        report.resolver = Some(name.to_string());
        report.identity = Some(identity);
        report.result = Some(data);
        Ok(report)
    }

    /// Counts and subscriptions as they stand now.
    pub fn summary(&self) -> Summary {
        Summary {
            callbacks: self.callback_counts(),
            live: self
                .collector
                .live_ids()
                .into_iter()
                .map(|id| {
                    let count = self.collector.count(&id);
                    (id, count)
                })
                .collect(),
            listeners: self.store.emitter().listener_count(),
            records: self.store.len(),
        }
    }

    /// The store being driven.
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    fn callback_counts(&self) -> BTreeMap<String, u64> {
        self.slots
            .iter()
            .map(|(name, slot)| (name.clone(), slot.callbacks.get()))
            .collect()
    }
}

// =============================================================================
// IDENTITY CLASSIFICATION
// =============================================================================

fn classify(prev: Option<&Data>, next: &Data) -> Identity {
    match prev {
        None => Identity::Fresh,
        Some(prev) if prev.same(next) => Identity::Unchanged,
        Some(prev) if shares_subtree(prev, next) => Identity::Recycled,
        Some(_) => Identity::Fresh,
    }
}

/// Whether some reference-carrying value in `next` is the same reference as
/// the value at the same position in `prev`.
fn shares_subtree(prev: &Data, next: &Data) -> bool {
    match (prev, next) {
        (Data::Str(a), Data::Str(b)) => Rc::ptr_eq(a, b),
        (Data::Record(a), Data::Record(b)) => {
            Rc::ptr_eq(a, b)
                || b.iter().any(|(key, child)| {
                    a.get(key)
                        .is_some_and(|old| shares_subtree(old, child))
                })
        }
        (Data::List(a), Data::List(b)) => {
            Rc::ptr_eq(a, b)
                || a
                    .iter()
                    .zip(b.iter())
                    .any(|(old, child)| shares_subtree(old, child))
        }
        _ => false,
    }
}

// =============================================================================
// TESTS
// =============================================================================
