//! # Structural Recycling
//!
//! Reconciles a freshly read `Data` tree against the previous one.
//!
//! Every subtree of `next` that is deeply equal to its counterpart in `prev`
//! is replaced by the `prev` handle, so unchanged parts keep their identity.
//! Records are matched by key and lists by index. When every child of a
//! container is recycled and the key set (or length) is unchanged, the
//! previous container itself is returned.
//!
//! Recursion depth is bounded by the fragment shape; resolved trees are
//! acyclic.

use crate::Data;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Recycle `next` into `prev`.
///
/// The returned tree is deeply equal to `next` and shares as many
/// allocations with `prev` as possible.
#[must_use]
pub fn recycle(prev: &Data, next: Data) -> Data {
    match (prev, next) {
        (Data::Record(old), Data::Record(new)) => recycle_record(prev, old, new),
        (Data::List(old), Data::List(new)) => recycle_list(prev, old, new),
        (_, next) => {
            if *prev == next {
                prev.clone()
            } else {
                next
            }
        }
    }
}

fn recycle_record(
    prev: &Data,
    old: &Rc<BTreeMap<String, Data>>,
    new: Rc<BTreeMap<String, Data>>,
) -> Data {
    if Rc::ptr_eq(old, &new) {
        return prev.clone();
    }

    let mut unchanged = old.len() == new.len();
    let fields: BTreeMap<String, Data> = new
        .iter()
        .map(|(key, value)| {
            let value = match old.get(key) {
                Some(previous) => {
                    let recycled = recycle(previous, value.clone());
                    unchanged &= recycled.same(previous);
                    recycled
                }
                None => {
                    unchanged = false;
                    value.clone()
                }
            };
            (key.clone(), value)
        })
        .collect();

    if unchanged {
        prev.clone()
    } else {
        Data::Record(Rc::new(fields))
    }
}

fn recycle_list(prev: &Data, old: &Rc<[Data]>, new: Rc<[Data]>) -> Data {
    if Rc::ptr_eq(old, &new) {
        return prev.clone();
    }

    let mut unchanged = old.len() == new.len();
    let items: Vec<Data> = new
        .iter()
        .enumerate()
        .map(|(index, value)| match old.get(index) {
            Some(previous) => {
                let recycled = recycle(previous, value.clone());
                unchanged &= recycled.same(previous);
                recycled
            }
            None => {
                unchanged = false;
                value.clone()
            }
        })
        .collect();

    if unchanged {
        prev.clone()
    } else {
        Data::List(Rc::from(items))
    }
}

// =============================================================================
// TESTS
// =============================================================================
