//! # Core Type Definitions
//!
//! This module contains the value types shared by every resolver and
//! collaborator:
//! - Record identifiers (`RecordId`)
//! - The resolved data tree (`Data`)
//! - The runtime shape of a resolve request (`Target`) and its answer (`Resolved`)
//! - Error types (`RelinkError`)
//!
//! ## Identity Guarantees
//!
//! `Data` containers are reference-counted. Cloning a `Data` never copies the
//! tree, and `Data::same` answers whether two handles point at the very same
//! allocation. Consumers rely on `same` as a cheap "did anything change" check.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

// =============================================================================
// RECORD IDENTIFIER
// =============================================================================

/// Identifier of a record (node) in the normalized store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    /// Create a new record identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// =============================================================================
// DATA
// =============================================================================

/// A resolved data tree.
///
/// Scalars are compared by value; strings, lists and records carry a
/// reference identity that survives cloning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Data {
    /// Missing value or missing record.
    #[default]
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Integer scalar.
    Int(i64),
    /// String scalar.
    Str(Rc<str>),
    /// Ordered list.
    List(Rc<[Data]>),
    /// Keyed record. Keys are sorted for deterministic output.
    Record(Rc<BTreeMap<String, Data>>),
}

impl Data {
    /// Build a string value.
    #[must_use]
    pub fn str(s: &str) -> Self {
        Self::Str(Rc::from(s))
    }

    /// Build a list value.
    #[must_use]
    pub fn list(items: Vec<Data>) -> Self {
        Self::List(Rc::from(items))
    }

    /// Build a record value from `(key, value)` pairs.
    #[must_use]
    pub fn record<K: Into<String>>(fields: impl IntoIterator<Item = (K, Data)>) -> Self {
        Self::Record(Rc::new(
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    /// Reference identity.
    ///
    /// True when both handles share the same allocation (strings, lists,
    /// records) or hold the same scalar value (null, booleans, integers).
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => Rc::ptr_eq(a, b),
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b),
            (Self::Record(a), Self::Record(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Look up a field of a record. Returns `None` for non-records.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Data> {
        match self {
            Self::Record(fields) => fields.get(field),
            _ => None,
        }
    }

    /// Look up an element of a list. Returns `None` for non-lists.
    #[must_use]
    pub fn at(&self, index: usize) -> Option<&Data> {
        match self {
            Self::List(items) => items.get(index),
            _ => None,
        }
    }

    /// Check for `Null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<&str> for Data {
    fn from(s: &str) -> Self {
        Self::str(s)
    }
}

impl From<i64> for Data {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<bool> for Data {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

// =============================================================================
// TARGET & RESOLVED
// =============================================================================

/// The identifier argument of a resolve call.
///
/// Its runtime shape decides between singular and plural resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A single record identifier.
    One(RecordId),
    /// An ordered sequence of record identifiers.
    Many(Vec<RecordId>),
}

impl Target {
    /// Build a plural target from anything yielding identifiers.
    pub fn many<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<RecordId>,
    {
        Self::Many(ids.into_iter().map(Into::into).collect())
    }

    /// Whether this target is a sequence.
    #[must_use]
    pub fn is_plural(&self) -> bool {
        matches!(self, Self::Many(_))
    }
}

impl From<RecordId> for Target {
    fn from(id: RecordId) -> Self {
        Self::One(id)
    }
}

impl From<&str> for Target {
    fn from(id: &str) -> Self {
        Self::One(RecordId::from(id))
    }
}

impl From<Vec<RecordId>> for Target {
    fn from(ids: Vec<RecordId>) -> Self {
        Self::Many(ids)
    }
}

impl From<Vec<&str>> for Target {
    fn from(ids: Vec<&str>) -> Self {
        Self::many(ids)
    }
}

/// The answer of the dispatcher: one tree or an ordered sequence of trees.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// Result of a singular resolution.
    One(Data),
    /// Result of a plural resolution. The slice itself carries identity.
    Many(Rc<[Data]>),
}

impl Resolved {
    /// Reference identity, see [`Data::same`].
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::One(a), Self::One(b)) => a.same(b),
            (Self::Many(a), Self::Many(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// The singular result, if any.
    #[must_use]
    pub fn as_one(&self) -> Option<&Data> {
        match self {
            Self::One(data) => Some(data),
            Self::Many(_) => None,
        }
    }

    /// The plural result, if any.
    #[must_use]
    pub fn as_many(&self) -> Option<&Rc<[Data]>> {
        match self {
            Self::Many(items) => Some(items),
            Self::One(_) => None,
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the relink system.
///
/// The resolvers never originate errors of their own; collaborator failures
/// are propagated unchanged through `Result<T, RelinkError>`.
#[derive(Debug, Error)]
pub enum RelinkError {
    /// The store's read routine failed.
    #[error("Read failed at {id}: {reason}")]
    ReadFailed { id: RecordId, reason: String },

    /// The change emitter refused a subscription.
    #[error("Subscribe failed: {0}")]
    SubscribeFailed(String),

    /// A fragment definition is malformed.
    #[error("Invalid fragment: {0}")]
    InvalidFragment(String),

    /// A scenario file could not be parsed or executed.
    #[error("Scenario error: {0}")]
    Scenario(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================
