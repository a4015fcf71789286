//! # relink-core
//!
//! Subscription-aware resolution of query fragments over a normalized,
//! graph-structured record store - THE LOGIC.
//!
//! Callers describe the data they need with a fragment and one identifier
//! (or a sequence of identifiers). The resolvers materialize that data from
//! the store, avoid redundant reads, keep the identity of unchanged
//! sub-results across calls, and notify the caller once when data they were
//! handed has gone stale.
//!
//! ## Layout
//!
//! - `resolver`: dispatcher, plural and single resolvers
//! - `recycle`: structural sharing between successive results
//! - `store`: collaborator traits (`Store`, `Fragment`, `ReferenceCollector`)
//! - `storage`, `emitter`, `collector`, `fragment`: in-memory reference
//!   implementations of those collaborators
//!
//! ## Architectural Constraints
//!
//! - Single-threaded and synchronous: `Rc`/`RefCell`, no locks, no async
//! - The resolvers never mutate the store and never fetch
//! - Change listeners only flag dirtiness; they never re-enter `resolve`

// =============================================================================
// MODULES
// =============================================================================

pub mod collector;
pub mod emitter;
pub mod fragment;
pub mod recycle;
pub mod resolver;
pub mod storage;
pub mod store;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{Data, RecordId, RelinkError, Resolved, Target};

// =============================================================================
// RE-EXPORTS: Resolution
// =============================================================================

pub use recycle::recycle;
pub use resolver::{PluralResolver, Resolver, ResolverKind, SingleResolver};
pub use store::{Fragment, Listener, ReadOutcome, ReferenceCollector, Store, Subscription};

// =============================================================================
// RE-EXPORTS: Reference Collaborators
// =============================================================================

pub use collector::{CollectorOp, RefCountCollector};
pub use emitter::ChangeEmitter;
pub use fragment::{FieldSelection, Selection, SelectionDef, Window};
pub use storage::{Batch, Field, Record, RecordStore};
