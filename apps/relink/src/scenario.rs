//! # Scenario Files
//!
//! A scenario seeds a `RecordStore`, names the fragments it uses, and lists
//! the steps to replay against it.
//!
//! ```toml
//! [store.records."1"]
//! name = "Alice"
//! friends = { links = ["2", "3"] }
//!
//! [store.views]
//! "1:page" = "1"
//!
//! [fragments.UserName]
//! fields = [{ name = "name" }]
//!
//! [[steps]]
//! action = "resolve"
//! fragment = "UserName"
//! id = "1"
//!
//! [[steps]]
//! action = "commit"
//! set = [{ id = "1", field = "name", value = "Alicia" }]
//! ```

use relink_core::{
    Field, FieldSelection, Record, RecordId, RecordStore, RefCountCollector, RelinkError,
    Selection, SelectionDef, Target,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

/// Maximum scenario file size (16 MB).
const MAX_SCENARIO_FILE_SIZE: u64 = 16 * 1024 * 1024;

/// Name of the resolver slot used when a step does not name one.
pub const DEFAULT_RESOLVER: &str = "main";

fn default_resolver() -> String {
    DEFAULT_RESOLVER.to_string()
}

// =============================================================================
// SCENARIO STRUCTURE
// =============================================================================

/// A complete scenario file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scenario {
    /// Initial store contents.
    #[serde(default)]
    pub store: StoreSeed,
    /// Fragments by name.
    #[serde(default)]
    pub fragments: BTreeMap<String, FragmentSpec>,
    /// Steps to replay, in order.
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// Initial records and views.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSeed {
    #[serde(default)]
    pub records: BTreeMap<RecordId, Record>,
    /// View identifier -> collection identifier.
    #[serde(default)]
    pub views: BTreeMap<RecordId, RecordId>,
}

/// A fragment definition; its name is the key it is stored under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    #[serde(default)]
    pub plural: bool,
    pub fields: Vec<FieldSelection>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, i64>,
}

impl FragmentSpec {
    /// Build the selection named `name`.
    pub fn to_selection(&self, name: &str) -> Result<Selection, RelinkError> {
        let selection = Selection::from(SelectionDef {
            name: name.to_string(),
            identity: self.identity.clone(),
            plural: self.plural,
            fields: self.fields.clone(),
            variables: self.variables.clone(),
        });
        selection.validate()?;
        Ok(selection)
    }
}

/// One field write inside a commit step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetOp {
    pub id: RecordId,
    pub field: String,
    pub value: Field,
}

/// A replay step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Resolve a fragment with a named resolver.
    Resolve {
        #[serde(default = "default_resolver")]
        resolver: String,
        fragment: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<RecordId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ids: Option<Vec<RecordId>>,
    },
    /// Apply writes to the store: whole-record `put`s, then field `set`s,
    /// then `remove`s.
    Commit {
        #[serde(default)]
        put: BTreeMap<RecordId, Record>,
        #[serde(default)]
        set: Vec<SetOp>,
        #[serde(default)]
        remove: Vec<RecordId>,
    },
    /// Dispose a named resolver.
    Dispose {
        #[serde(default = "default_resolver")]
        resolver: String,
    },
    /// Garbage-collect records nobody references.
    Sweep,
}

impl Step {
    /// Short name of the step kind.
    #[must_use]
    pub fn action(&self) -> &'static str {
        match self {
            Self::Resolve { .. } => "resolve",
            Self::Commit { .. } => "commit",
            Self::Dispose { .. } => "dispose",
            Self::Sweep => "sweep",
        }
    }
}

/// Turn the `id` / `ids` pair of a resolve step into a target.
pub fn target_of(id: Option<&RecordId>, ids: Option<&Vec<RecordId>>) -> Result<Target, RelinkError> {
    match (id, ids) {
        (Some(id), None) => Ok(Target::One(id.clone())),
        (None, Some(ids)) => Ok(Target::Many(ids.clone())),
        (Some(_), Some(_)) => Err(RelinkError::Scenario(
            "resolve step has both `id` and `ids`".to_string(),
        )),
        (None, None) => Err(RelinkError::Scenario(
            "resolve step needs `id` or `ids`".to_string(),
        )),
    }
}

// =============================================================================
// LOADING & VALIDATION
// =============================================================================

impl Scenario {
    /// Parse a scenario from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, RelinkError> {
        toml::from_str(text).map_err(|e| RelinkError::Scenario(e.to_string()))
    }

    /// Read and parse a scenario file.
    pub fn load(path: &Path) -> Result<Self, RelinkError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            RelinkError::IoError(format!("Cannot read '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_SCENARIO_FILE_SIZE {
            return Err(RelinkError::Scenario(format!(
                "File size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_SCENARIO_FILE_SIZE
            )));
        }

        let text = std::fs::read_to_string(path).map_err(|e| {
            RelinkError::IoError(format!("Cannot read '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    /// Build every fragment, validating each.
    pub fn selections(&self) -> Result<BTreeMap<String, Selection>, RelinkError> {
        self.fragments
            .iter()
            .map(|(name, spec)| Ok((name.clone(), spec.to_selection(name)?)))
            .collect()
    }

    /// Check fragments and steps without running anything.
    pub fn validate(&self) -> Result<(), RelinkError> {
        let selections = self.selections()?;
        for (index, step) in self.steps.iter().enumerate() {
            if let Step::Resolve {
                fragment, id, ids, ..
            } = step
            {
                if !selections.contains_key(fragment) {
                    return Err(RelinkError::Scenario(format!(
                        "step {}: unknown fragment '{}'",
                        index, fragment
                    )));
                }
                target_of(id.as_ref(), ids.as_ref()).map_err(|e| {
                    RelinkError::Scenario(format!("step {}: {}", index, e))
                })?;
            }
        }
        Ok(())
    }

    /// Create the seeded store and its reference collector.
    #[must_use]
    pub fn build_store(&self) -> (Rc<RecordStore>, Rc<RefCountCollector>) {
        let collector = Rc::new(RefCountCollector::new());
        let store = RecordStore::with_collector(Rc::clone(&collector))
            .with_records(self.store.records.clone());
        for (view, collection) in &self.store.views {
            store.add_view(view.clone(), collection.clone());
        }
        (Rc::new(store), collector)
    }
}

// =============================================================================
// TESTS
// =============================================================================
