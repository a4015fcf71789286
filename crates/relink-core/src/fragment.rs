//! # Selection Fragments
//!
//! `Selection` is the fragment type understood by `RecordStore`: a named tree
//! of field selections plus the runtime variables it was instantiated with.
//!
//! Two selections are equivalent when they carry the same identity token,
//! the same field tree and the same variables. A selection re-instantiated
//! with different variables keeps its identity but is no longer equivalent,
//! which forces a re-read.

use crate::RelinkError;
use crate::store::Fragment;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::rc::Rc;

// =============================================================================
// WINDOW
// =============================================================================

/// Window argument of a plural linked field: how many items to read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Window {
    /// A literal item count.
    Literal(usize),
    /// A variable reference, written `$name`.
    Variable(String),
}

impl Window {
    /// Resolve the window against a variable map.
    pub fn resolve(&self, variables: &BTreeMap<String, i64>) -> Result<usize, RelinkError> {
        match self {
            Self::Literal(n) => Ok(*n),
            Self::Variable(reference) => {
                let name = reference.strip_prefix('$').unwrap_or(reference);
                let value = variables.get(name).ok_or_else(|| {
                    RelinkError::InvalidFragment(format!("unbound variable ${}", name))
                })?;
                usize::try_from(*value).map_err(|_| {
                    RelinkError::InvalidFragment(format!("${} must be non-negative", name))
                })
            }
        }
    }
}

// =============================================================================
// FIELD SELECTION
// =============================================================================

/// One selected field. A field with nested `fields` follows links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSelection {
    /// Field name in the store.
    pub name: String,
    /// Output key, if different from `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Window applied to a plural link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first: Option<Window>,
    /// Nested selection applied to linked records.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldSelection>,
}

impl FieldSelection {
    /// Select a scalar field.
    #[must_use]
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            first: None,
            fields: Vec::new(),
        }
    }

    /// Select a linked field and read `fields` on the linked record(s).
    #[must_use]
    pub fn linked(name: impl Into<String>, fields: Vec<FieldSelection>) -> Self {
        Self {
            fields,
            ..Self::scalar(name)
        }
    }

    /// Output this field under `alias`.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Read only the first items of a plural link.
    #[must_use]
    pub fn first(mut self, window: Window) -> Self {
        self.first = Some(window);
        self
    }

    /// Key under which the field appears in the result.
    #[must_use]
    pub fn output_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Whether this field follows links.
    #[must_use]
    pub fn is_linked(&self) -> bool {
        !self.fields.is_empty()
    }

    fn validate(&self, variables: &BTreeMap<String, i64>) -> Result<(), RelinkError> {
        if self.name.is_empty() {
            return Err(RelinkError::InvalidFragment(
                "field with empty name".to_string(),
            ));
        }
        if let Some(window) = &self.first {
            window.resolve(variables)?;
        }
        self.fields
            .iter()
            .try_for_each(|field| field.validate(variables))
    }
}

// =============================================================================
// SELECTION
// =============================================================================

/// Serializable definition of a selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionDef {
    /// Debug name.
    pub name: String,
    /// Identity token; defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    /// Declared plurality.
    #[serde(default)]
    pub plural: bool,
    /// Selected fields.
    pub fields: Vec<FieldSelection>,
    /// Runtime variables.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, i64>,
}

/// A fragment readable by `RecordStore`. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SelectionDef", into = "SelectionDef")]
pub struct Selection(Rc<SelectionDef>);

impl From<SelectionDef> for Selection {
    fn from(def: SelectionDef) -> Self {
        Self(Rc::new(def))
    }
}

impl From<Selection> for SelectionDef {
    fn from(selection: Selection) -> Self {
        Rc::unwrap_or_clone(selection.0)
    }
}

impl Selection {
    /// Create a singular selection named `name` over `fields`.
    #[must_use]
    pub fn new(name: impl Into<String>, fields: Vec<FieldSelection>) -> Self {
        Self::from(SelectionDef {
            name: name.into(),
            identity: None,
            plural: false,
            fields,
            variables: BTreeMap::new(),
        })
    }

    fn edit(self, f: impl FnOnce(&mut SelectionDef)) -> Self {
        let mut def = Rc::unwrap_or_clone(self.0);
        f(&mut def);
        Self::from(def)
    }

    /// Use an explicit identity token.
    #[must_use]
    pub fn with_identity(self, identity: impl Into<String>) -> Self {
        let identity = identity.into();
        self.edit(|def| def.identity = Some(identity))
    }

    /// Declare the selection plural.
    #[must_use]
    pub fn plural(self) -> Self {
        self.edit(|def| def.plural = true)
    }

    /// Bind a runtime variable.
    #[must_use]
    pub fn with_variable(self, name: impl Into<String>, value: i64) -> Self {
        let name = name.into();
        self.edit(|def| {
            def.variables.insert(name, value);
        })
    }

    /// Selected fields.
    #[must_use]
    pub fn fields(&self) -> &[FieldSelection] {
        &self.0.fields
    }

    /// Runtime variables.
    #[must_use]
    pub fn variables(&self) -> &BTreeMap<String, i64> {
        &self.0.variables
    }

    /// Check field names and variable bindings.
    pub fn validate(&self) -> Result<(), RelinkError> {
        if self.0.fields.is_empty() {
            return Err(RelinkError::InvalidFragment(format!(
                "{} selects no fields",
                self.0.name
            )));
        }
        self.0
            .fields
            .iter()
            .try_for_each(|field| field.validate(&self.0.variables))
    }
}

impl Fragment for Selection {
    fn concrete_identity(&self) -> &str {
        self.0.identity.as_deref().unwrap_or(&self.0.name)
    }

    fn is_plural(&self) -> bool {
        self.0.plural
    }

    fn debug_name(&self) -> &str {
        &self.0.name
    }

    fn is_equivalent(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
            || (self.concrete_identity() == other.concrete_identity()
                && self.0.fields == other.0.fields
                && self.0.variables == other.0.variables)
    }
}

// =============================================================================
// TESTS
// =============================================================================
