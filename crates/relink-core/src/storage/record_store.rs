//! # In-Memory Record Store
//!
//! A normalized, graph-structured record store.
//!
//! Records map field names to scalar values or links to other records.
//! Reading a `Selection` walks the links from a root record and reports
//! every record it visited. Mutations go through `commit`, which applies a
//! batch of writes and notifies the change emitter once for the batch.
//!
//! ## Views
//!
//! A view identifier (for example one windowed page of a connection) is an
//! alias of an underlying collection record. `canonicalize` maps a view to
//! its collection; reads and writes through a view act on the collection.

use crate::collector::RefCountCollector;
use crate::emitter::ChangeEmitter;
use crate::fragment::{FieldSelection, Selection};
use crate::store::{Listener, ReadOutcome, ReferenceCollector, Store, Subscription};
use crate::{Data, RecordId, RelinkError};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

// =============================================================================
// FIELD & RECORD
// =============================================================================

/// Value stored under one field of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "FieldRepr", into = "FieldRepr")]
pub enum Field {
    /// A scalar (or inline structured) value.
    Value(Data),
    /// A link to one record.
    Link(RecordId),
    /// An ordered list of links.
    Links(Vec<RecordId>),
}

/// On-disk shape: `{ link = "id" }`, `{ links = [...] }`, or a plain value.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum FieldRepr {
    Link { link: RecordId },
    Links { links: Vec<RecordId> },
    Value(Data),
}

impl From<FieldRepr> for Field {
    fn from(repr: FieldRepr) -> Self {
        match repr {
            FieldRepr::Link { link } => Self::Link(link),
            FieldRepr::Links { links } => Self::Links(links),
            FieldRepr::Value(value) => Self::Value(value),
        }
    }
}

impl From<Field> for FieldRepr {
    fn from(field: Field) -> Self {
        match field {
            Field::Link(link) => Self::Link { link },
            Field::Links(links) => Self::Links { links },
            Field::Value(value) => Self::Value(value),
        }
    }
}

impl From<Data> for Field {
    fn from(value: Data) -> Self {
        Self::Value(value)
    }
}

/// A normalized record: field name -> field value.
pub type Record = BTreeMap<String, Field>;

// =============================================================================
// BATCH
// =============================================================================

#[derive(Debug)]
enum Write {
    Set {
        id: RecordId,
        field: String,
        value: Field,
    },
    Put {
        id: RecordId,
        record: Record,
    },
    Remove(RecordId),
}

/// Writes collected by `RecordStore::commit` and applied atomically.
#[derive(Debug, Default)]
pub struct Batch {
    writes: Vec<Write>,
}

impl Batch {
    /// Set a scalar field, creating the record if needed.
    pub fn set(
        &mut self,
        id: impl Into<RecordId>,
        field: impl Into<String>,
        value: impl Into<Data>,
    ) -> &mut Self {
        self.set_field(id, field, Field::Value(value.into()))
    }

    /// Point a field at one record.
    pub fn link(
        &mut self,
        id: impl Into<RecordId>,
        field: impl Into<String>,
        target: impl Into<RecordId>,
    ) -> &mut Self {
        self.set_field(id, field, Field::Link(target.into()))
    }

    /// Point a field at an ordered list of records.
    pub fn link_many<T: Into<RecordId>>(
        &mut self,
        id: impl Into<RecordId>,
        field: impl Into<String>,
        targets: impl IntoIterator<Item = T>,
    ) -> &mut Self {
        let targets = targets.into_iter().map(Into::into).collect();
        self.set_field(id, field, Field::Links(targets))
    }

    /// Set any field value.
    pub fn set_field(
        &mut self,
        id: impl Into<RecordId>,
        field: impl Into<String>,
        value: Field,
    ) -> &mut Self {
        self.writes.push(Write::Set {
            id: id.into(),
            field: field.into(),
            value,
        });
        self
    }

    /// Replace a whole record.
    pub fn put(&mut self, id: impl Into<RecordId>, record: Record) -> &mut Self {
        self.writes.push(Write::Put {
            id: id.into(),
            record,
        });
        self
    }

    /// Delete a record.
    pub fn remove(&mut self, id: impl Into<RecordId>) -> &mut Self {
        self.writes.push(Write::Remove(id.into()));
        self
    }

    /// Whether the batch holds no writes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

// =============================================================================
// RECORD STORE
// =============================================================================

/// In-memory normalized store implementing [`Store`] for [`Selection`].
#[derive(Debug, Default)]
pub struct RecordStore {
    records: RefCell<BTreeMap<RecordId, Record>>,
    views: RefCell<BTreeMap<RecordId, RecordId>>,
    emitter: ChangeEmitter,
    collector: Option<Rc<RefCountCollector>>,
}

impl RecordStore {
    /// Create an empty store without a reference collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store reporting liveness to `collector`.
    #[must_use]
    pub fn with_collector(collector: Rc<RefCountCollector>) -> Self {
        Self {
            collector: Some(collector),
            ..Self::default()
        }
    }

    /// Seed the store with records. No change notification is emitted.
    #[must_use]
    pub fn with_records(self, records: BTreeMap<RecordId, Record>) -> Self {
        self.records.borrow_mut().extend(records);
        self
    }

    /// Register `view` as a view of `collection`.
    ///
    /// Registering a view of a view resolves to the underlying collection,
    /// so canonicalization stays a single lookup.
    pub fn add_view(&self, view: impl Into<RecordId>, collection: impl Into<RecordId>) {
        let collection = self.canonicalize(&collection.into());
        self.views.borrow_mut().insert(view.into(), collection);
    }

    /// The change emitter of this store.
    #[must_use]
    pub fn emitter(&self) -> &ChangeEmitter {
        &self.emitter
    }

    /// A copy of one record.
    #[must_use]
    pub fn record(&self, id: &RecordId) -> Option<Record> {
        self.records.borrow().get(&self.canonicalize(id)).cloned()
    }

    /// A copy of all records.
    #[must_use]
    pub fn records(&self) -> BTreeMap<RecordId, Record> {
        self.records.borrow().clone()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    /// Apply a batch of writes and notify listeners of the records that
    /// actually changed. Returns the changed (canonical) identifiers.
    pub fn commit(&self, build: impl FnOnce(&mut Batch)) -> BTreeSet<RecordId> {
        let mut batch = Batch::default();
        build(&mut batch);

        let changed = {
            let mut records = self.records.borrow_mut();
            let mut changed = BTreeSet::new();
            for write in batch.writes {
                match write {
                    Write::Set { id, field, value } => {
                        let id = self.canonicalize(&id);
                        let record = records.entry(id.clone()).or_default();
                        if record.get(&field) != Some(&value) {
                            record.insert(field, value);
                            changed.insert(id);
                        }
                    }
                    Write::Put { id, record } => {
                        let id = self.canonicalize(&id);
                        if records.get(&id) != Some(&record) {
                            records.insert(id.clone(), record);
                            changed.insert(id);
                        }
                    }
                    Write::Remove(id) => {
                        let id = self.canonicalize(&id);
                        if records.remove(&id).is_some() {
                            changed.insert(id);
                        }
                    }
                }
            }
            changed
        };

        tracing::debug!(changed = changed.len(), "commit");
        self.emitter.notify(&changed);
        changed
    }

    /// Drop records whose reference count has fallen to zero.
    ///
    /// Records that were never referenced are kept. Returns the removed ids.
    pub fn sweep(&self) -> Vec<RecordId> {
        let Some(collector) = &self.collector else {
            return Vec::new();
        };

        let mut records = self.records.borrow_mut();
        let mut removed = Vec::new();
        for id in collector.released_ids() {
            if records.remove(&id).is_some() {
                removed.push(id.clone());
            }
            collector.forget(&id);
        }

        tracing::debug!(removed = removed.len(), "sweep");
        removed
    }

    fn read_record(
        &self,
        records: &BTreeMap<RecordId, Record>,
        selection: &Selection,
        fields: &[FieldSelection],
        id: &RecordId,
        touched: &mut BTreeSet<RecordId>,
    ) -> Result<Data, RelinkError> {
        let id = self.canonicalize(id);
        touched.insert(id.clone());
        let Some(record) = records.get(&id) else {
            return Ok(Data::Null);
        };

        let mut out = BTreeMap::new();
        for field in fields {
            let value = match record.get(&field.name) {
                None => Data::Null,
                Some(Field::Value(value)) => {
                    if field.is_linked() {
                        Data::Null
                    } else {
                        value.clone()
                    }
                }
                Some(Field::Link(target)) => {
                    if field.is_linked() {
                        self.read_record(records, selection, &field.fields, target, touched)?
                    } else {
                        Data::str(target.as_str())
                    }
                }
                Some(Field::Links(targets)) => {
                    let limit = match &field.first {
                        Some(window) => window.resolve(selection.variables())?,
                        None => targets.len(),
                    };
                    let items = targets
                        .iter()
                        .take(limit)
                        .map(|target| {
                            if field.is_linked() {
                                self.read_record(records, selection, &field.fields, target, touched)
                            } else {
                                Ok(Data::str(target.as_str()))
                            }
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    Data::list(items)
                }
            };
            out.insert(field.output_key().to_string(), value);
        }

        Ok(Data::Record(Rc::new(out)))
    }
}

impl Store for RecordStore {
    type Fragment = Selection;

    fn read(&self, fragment: &Selection, id: &RecordId) -> Result<ReadOutcome, RelinkError> {
        let records = self.records.borrow();
        let mut touched = BTreeSet::new();
        let data = self.read_record(&records, fragment, fragment.fields(), id, &mut touched)?;
        Ok(ReadOutcome::new(data, touched))
    }

    fn canonicalize(&self, id: &RecordId) -> RecordId {
        self.views.borrow().get(id).cloned().unwrap_or_else(|| id.clone())
    }

    fn subscribe(
        &self,
        ids: &BTreeSet<RecordId>,
        listener: Listener,
    ) -> Result<Subscription, RelinkError> {
        Ok(self.emitter.subscribe(ids, listener))
    }

    fn collector(&self) -> Option<&dyn ReferenceCollector> {
        self.collector
            .as_deref()
            .map(|collector| collector as &dyn ReferenceCollector)
    }
}

// =============================================================================
// TESTS
// =============================================================================
