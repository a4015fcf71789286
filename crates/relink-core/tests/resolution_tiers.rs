//! # Resolution Tier Tests (R0-R4)
//!
//! Behavioral checks of the resolvers against the in-memory store.
//!
//! ## Tiers
//! - R0: Identity Stability
//! - R1: Structural Recycling
//! - R2: Plural Semantics
//! - R3: Subscription Lifecycle
//! - R4: Collaborator Failures

use relink_core::{
    Data, FieldSelection, Fragment, Listener, ReadOutcome, RecordId, RecordStore, RefCountCollector,
    ReferenceCollector, RelinkError, Resolved, Resolver, Selection, Store, Subscription, Window,
};
use std::cell::Cell;
use std::collections::BTreeSet;
use std::rc::Rc;

// =============================================================================
// FIXTURES
// =============================================================================

fn seeded(collector: &Rc<RefCountCollector>) -> Rc<RecordStore> {
    let store = Rc::new(RecordStore::with_collector(Rc::clone(collector)));
    store.commit(|batch| {
        batch
            .set("1", "name", "Alice")
            .link("1", "address", "a1")
            .link_many("1", "friends", ["2", "3", "4"])
            .set("a1", "city", "Berlin")
            .set("2", "name", "Bob")
            .set("3", "name", "Carol")
            .set("4", "name", "Dave");
    });
    store
}

fn counter() -> (Rc<Cell<u32>>, Listener) {
    let calls = Rc::new(Cell::new(0));
    let inner = Rc::clone(&calls);
    (calls, Rc::new(move || inner.set(inner.get() + 1)))
}

fn profile() -> Selection {
    Selection::new(
        "Profile",
        vec![
            FieldSelection::scalar("name"),
            FieldSelection::linked("address", vec![FieldSelection::scalar("city")]),
        ],
    )
}

fn friends(count: i64) -> Selection {
    Selection::new(
        "Friends",
        vec![
            FieldSelection::scalar("name"),
            FieldSelection::linked("friends", vec![FieldSelection::scalar("name")])
                .first(Window::Variable("$count".into())),
        ],
    )
    .with_variable("count", count)
}

fn one(resolved: &Resolved) -> &Data {
    resolved.as_one().expect("singular result")
}

// =============================================================================
// TIER R0: IDENTITY STABILITY
// =============================================================================

mod r0_identity {
    use super::*;

    /// R0.1: Same fragment, same id, no mutation: same reference.
    #[test]
    fn repeated_resolve_returns_same_reference() {
        let collector = Rc::new(RefCountCollector::new());
        let store = seeded(&collector);
        let (_, on_change) = counter();
        let mut resolver = Resolver::new(Rc::clone(&store), profile(), on_change);

        let first = resolver.resolve(&profile(), "1").expect("first");
        let second = resolver.resolve(&profile(), "1").expect("second");
        assert!(first.same(&second));
    }

    /// R0.2: An equivalent but distinct fragment instance is still a hit.
    #[test]
    fn equivalent_fragment_instance_reuses() {
        let collector = Rc::new(RefCountCollector::new());
        let store = seeded(&collector);
        let (_, on_change) = counter();
        let mut resolver = Resolver::new(Rc::clone(&store), friends(2), on_change);

        let first = resolver.resolve(&friends(2), "1").expect("first");
        let second = resolver.resolve(&friends(2), "1").expect("second");
        assert!(first.same(&second));
    }

    /// R0.3: Changed runtime variables force a re-read.
    #[test]
    fn changed_variables_reread() {
        let collector = Rc::new(RefCountCollector::new());
        let store = seeded(&collector);
        let (_, on_change) = counter();
        let mut resolver = Resolver::new(Rc::clone(&store), friends(2), on_change);

        let two = resolver.resolve(&friends(2), "1").expect("two");
        let three = resolver.resolve(&friends(3), "1").expect("three");
        assert!(!two.same(&three));

        let two = one(&two);
        let three = one(&three);
        assert_eq!(
            three
                .get("friends")
                .and_then(|f| f.at(2))
                .and_then(|f| f.get("name")),
            Some(&Data::str("Dave"))
        );
        assert!(three.get("name").expect("name").same(two.get("name").expect("name")));
        let old_first = two.get("friends").and_then(|f| f.at(0)).expect("first friend");
        let new_first = three.get("friends").and_then(|f| f.at(0)).expect("first friend");
        assert!(new_first.same(old_first));
    }
}

// =============================================================================
// TIER R1: STRUCTURAL RECYCLING
// =============================================================================

mod r1_recycling {
    use super::*;

    /// R1.1: The end-to-end example: a dirtied re-read with unchanged
    /// content yields the exact previous reference.
    #[test]
    fn dirty_reread_with_same_content_keeps_reference() {
        let collector = Rc::new(RefCountCollector::new());
        let store = Rc::new(RecordStore::with_collector(Rc::clone(&collector)));
        store.commit(|batch| {
            batch.set("1", "name", "Alice");
        });
        let fragment = Selection::new("Name", vec![FieldSelection::scalar("name")]);
        let (calls, on_change) = counter();
        let mut resolver = Resolver::new(Rc::clone(&store), fragment.clone(), on_change);

        let first = resolver.resolve(&fragment, "1").expect("first");
        assert_eq!(one(&first), &Data::record([("name", Data::str("Alice"))]));
        assert!(store.emitter().is_watched(&RecordId::from("1")));

        store.commit(|batch| {
            batch.set("1", "nickname", "Al");
        });
        assert_eq!(calls.get(), 1);
        assert!(resolver.is_dirty());

        let second = resolver.resolve(&fragment, "1").expect("second");
        assert!(second.same(&first));
        assert!(!resolver.is_dirty());
    }

    /// R1.2: Unchanged subtrees keep their identity across a changed re-read.
    #[test]
    fn unchanged_subtree_keeps_identity() {
        let collector = Rc::new(RefCountCollector::new());
        let store = seeded(&collector);
        let (_, on_change) = counter();
        let mut resolver = Resolver::new(Rc::clone(&store), profile(), on_change);

        let before = resolver.resolve(&profile(), "1").expect("before");
        store.commit(|batch| {
            batch.set("1", "name", "Alicia");
        });
        let after = resolver.resolve(&profile(), "1").expect("after");

        assert!(!after.same(&before));
        let old_address = one(&before).get("address").expect("address");
        assert!(one(&after).get("address").expect("address").same(old_address));
    }

    /// R1.3: Switching canonical target never reuses references.
    #[test]
    fn canonical_switch_discards_recycling() {
        let collector = Rc::new(RefCountCollector::new());
        let store = seeded(&collector);
        store.commit(|batch| {
            batch
                .set("5", "name", "Alice")
                .link("5", "address", "a1");
        });
        let (_, on_change) = counter();
        let mut resolver = Resolver::new(Rc::clone(&store), profile(), on_change);

        let alice = resolver.resolve(&profile(), "1").expect("alice");
        let twin = resolver.resolve(&profile(), "5").expect("twin");

        assert_eq!(one(&alice), one(&twin));
        assert!(!twin.same(&alice));
        assert!(
            !one(&twin)
                .get("address")
                .expect("address")
                .same(one(&alice).get("address").expect("address"))
        );
    }

    /// R1.3b: Switching between two records with equal content (both
    /// missing) still moves the subscription and the counts.
    #[test]
    fn canonical_switch_between_missing_records_resubscribes() {
        let collector = Rc::new(RefCountCollector::new());
        let store = seeded(&collector);
        let (calls, on_change) = counter();
        let mut resolver = Resolver::new(Rc::clone(&store), profile(), on_change);

        let x = resolver.resolve(&profile(), "x").expect("x");
        let y = resolver.resolve(&profile(), "y").expect("y");
        assert!(one(&x).is_null() && one(&y).is_null());

        assert!(!store.emitter().is_watched(&RecordId::from("x")));
        assert!(store.emitter().is_watched(&RecordId::from("y")));
        assert_eq!(collector.count(&RecordId::from("x")), 0);
        assert_eq!(collector.count(&RecordId::from("y")), 1);

        store.commit(|batch| {
            batch.set("x", "name", "Xena");
        });
        assert_eq!(calls.get(), 0);

        store.commit(|batch| {
            batch.set("y", "name", "Yan");
        });
        assert_eq!(calls.get(), 1);
        let created = resolver.resolve(&profile(), "y").expect("created");
        assert_eq!(one(&created).get("name"), Some(&Data::str("Yan")));
    }

    /// R1.4: Drifting between views of one collection recycles, and an
    /// unchanged result keeps the existing subscription.
    #[test]
    fn view_drift_recycles_within_collection() {
        let collector = Rc::new(RefCountCollector::new());
        let store = seeded(&collector);
        store.add_view("1:page(0)", "1");
        store.add_view("1:page(1)", "1");
        let (_, on_change) = counter();
        let mut resolver = Resolver::new(Rc::clone(&store), friends(2), on_change);

        let page0 = resolver.resolve(&friends(2), "1:page(0)").expect("page0");
        let page1 = resolver.resolve(&friends(2), "1:page(1)").expect("page1");
        assert!(page1.same(&page0));

        let ids: BTreeSet<RecordId> = ["1", "1:page(0)", "2", "3"]
            .into_iter()
            .map(RecordId::from)
            .collect();
        assert!(ids.iter().all(|id| store.emitter().is_watched(id)));
        assert_eq!(store.emitter().listener_count(), 1);
    }
}

// =============================================================================
// TIER R2: PLURAL SEMANTICS
// =============================================================================

mod r2_plural {
    use super::*;

    fn name() -> Selection {
        Selection::new("Name", vec![FieldSelection::scalar("name")]).plural()
    }

    /// R2.1: A 2-prefix of a 3-sequence shares both element references.
    #[test]
    fn prefix_shares_elements() {
        let collector = Rc::new(RefCountCollector::new());
        let store = seeded(&collector);
        let (_, on_change) = counter();
        let mut resolver = Resolver::new(Rc::clone(&store), name(), on_change);

        let three = resolver.resolve(&name(), vec!["2", "3", "4"]).expect("three");
        let two = resolver.resolve(&name(), vec!["2", "3"]).expect("two");

        let three = three.as_many().expect("plural");
        let two = two.as_many().expect("plural");
        assert_eq!(two.len(), 2);
        assert!(!Rc::ptr_eq(three, two));
        assert!(two[0].same(&three[0]));
        assert!(two[1].same(&three[1]));
        assert_eq!(collector.count(&RecordId::from("4")), 0);
    }

    /// R2.2: Unchanged sequence keeps the slice reference.
    #[test]
    fn unchanged_sequence_keeps_slice() {
        let collector = Rc::new(RefCountCollector::new());
        let store = seeded(&collector);
        let (_, on_change) = counter();
        let mut resolver = Resolver::new(Rc::clone(&store), name(), on_change);

        let a = resolver.resolve(&name(), vec!["2", "3"]).expect("a");
        let b = resolver.resolve(&name(), vec!["2", "3"]).expect("b");
        assert!(a.same(&b));
    }

    /// R2.2b: An index moving between two missing records follows the new
    /// record even though both read as null.
    #[test]
    fn element_switch_between_missing_records_resubscribes() {
        let collector = Rc::new(RefCountCollector::new());
        let store = seeded(&collector);
        let (calls, on_change) = counter();
        let mut resolver = Resolver::new(Rc::clone(&store), name(), on_change);

        resolver.resolve(&name(), vec!["2", "x"]).expect("first");
        let second = resolver.resolve(&name(), vec!["2", "y"]).expect("second");
        assert!(second.as_many().expect("plural")[1].is_null());

        assert!(!store.emitter().is_watched(&RecordId::from("x")));
        assert!(store.emitter().is_watched(&RecordId::from("y")));
        assert_eq!(collector.count(&RecordId::from("x")), 0);
        assert_eq!(collector.count(&RecordId::from("y")), 1);

        store.commit(|batch| {
            batch.set("y", "name", "Yan");
        });
        assert_eq!(calls.get(), 1);
        let third = resolver.resolve(&name(), vec!["2", "y"]).expect("third");
        let third = third.as_many().expect("plural");
        assert_eq!(third[1].get("name"), Some(&Data::str("Yan")));
    }

    /// R2.3: Reordering is resolved per index, not by identifier.
    #[test]
    fn reorder_resolves_by_index() {
        let collector = Rc::new(RefCountCollector::new());
        let store = seeded(&collector);
        let (_, on_change) = counter();
        let mut resolver = Resolver::new(Rc::clone(&store), name(), on_change);

        let a = resolver.resolve(&name(), vec!["2", "3"]).expect("a");
        let b = resolver.resolve(&name(), vec!["3", "2"]).expect("b");

        let a = a.as_many().expect("plural");
        let b = b.as_many().expect("plural");
        assert_eq!(b[0], a[1]);
        assert!(!b[0].same(&a[1]));
        assert!(!b[0].same(&a[0]));
    }
}

// =============================================================================
// TIER R3: SUBSCRIPTION LIFECYCLE
// =============================================================================

mod r3_lifecycle {
    use super::*;

    /// R3.1: Two notifications before the next resolve: one callback.
    #[test]
    fn notifications_are_debounced() {
        let collector = Rc::new(RefCountCollector::new());
        let store = seeded(&collector);
        let (calls, on_change) = counter();
        let mut resolver = Resolver::new(Rc::clone(&store), profile(), on_change);
        resolver.resolve(&profile(), "1").expect("resolve");

        store.commit(|batch| {
            batch.set("1", "name", "A");
        });
        store.commit(|batch| {
            batch.set("a1", "city", "B");
        });
        assert_eq!(calls.get(), 1);
    }

    /// R3.2: Dispose twice, and dispose before resolve.
    #[test]
    fn dispose_is_idempotent() {
        let collector = Rc::new(RefCountCollector::new());
        let store = seeded(&collector);
        let (calls, on_change) = counter();
        let mut resolver = Resolver::new(Rc::clone(&store), profile(), on_change);
        resolver.dispose();

        resolver.resolve(&profile(), "1").expect("resolve");
        resolver.dispose();
        resolver.dispose();
        assert_eq!(store.emitter().listener_count(), 0);

        store.commit(|batch| {
            batch.set("1", "name", "A");
        });
        assert_eq!(calls.get(), 0);
    }

    /// R3.3: Any resolve sequence ending in dispose nets to zero.
    #[test]
    fn reference_counts_are_conserved() {
        let collector = Rc::new(RefCountCollector::with_journal());
        let store = seeded(&collector);
        store.add_view("1:page", "1");
        let (_, on_change) = counter();
        let mut resolver = Resolver::new(Rc::clone(&store), friends(2), on_change);

        resolver.resolve(&friends(2), "1").expect("r");
        resolver.resolve(&friends(3), "1:page").expect("r");
        store.commit(|batch| {
            batch.set("3", "name", "Caroline");
        });
        resolver.resolve(&friends(3), "1:page").expect("r");
        resolver.resolve(&friends(1), vec!["1", "2"]).expect("r");
        resolver.resolve(&friends(1), vec!["2"]).expect("r");
        resolver.resolve(&friends(2), "4").expect("r");
        resolver.dispose();

        assert!(!collector.journal().is_empty());
        assert!(collector.net_by_id().values().all(|net| *net == 0));
        assert!(collector.live_ids().is_empty());
    }

    /// R3.4: Views count against their canonical collection.
    #[test]
    fn views_count_canonically() {
        let collector = Rc::new(RefCountCollector::new());
        let store = seeded(&collector);
        store.add_view("1:page", "1");
        let (_, on_change) = counter();
        let mut resolver = Resolver::new(Rc::clone(&store), profile(), on_change);

        resolver.resolve(&profile(), "1:page").expect("resolve");
        assert_eq!(collector.count(&RecordId::from("1")), 2);
        assert_eq!(collector.count(&RecordId::from("1:page")), 0);
    }

    /// R3.5: Released records can be swept after dispose.
    #[test]
    fn sweep_after_dispose() {
        let collector = Rc::new(RefCountCollector::new());
        let store = seeded(&collector);
        let (_, on_change) = counter();
        let mut resolver = Resolver::new(Rc::clone(&store), profile(), on_change);

        resolver.resolve(&profile(), "1").expect("resolve");
        assert!(store.sweep().is_empty());

        resolver.dispose();
        let swept = store.sweep();
        assert_eq!(swept, vec![RecordId::from("1"), RecordId::from("a1")]);
        assert!(store.record(&RecordId::from("2")).is_some());
    }

    /// R3.6: No collector: bookkeeping is skipped entirely.
    #[test]
    fn works_without_collector() {
        let store = Rc::new(RecordStore::new());
        store.commit(|batch| {
            batch.set("1", "name", "Alice");
        });
        let fragment = Selection::new("Name", vec![FieldSelection::scalar("name")]);
        let (calls, on_change) = counter();
        let mut resolver = Resolver::new(Rc::clone(&store), fragment.clone(), on_change);

        resolver.resolve(&fragment, "1").expect("resolve");
        store.commit(|batch| {
            batch.set("1", "name", "Bob");
        });
        assert_eq!(calls.get(), 1);
        resolver.dispose();
        assert_eq!(store.emitter().listener_count(), 0);
    }
}

// =============================================================================
// TIER R4: COLLABORATOR FAILURES
// =============================================================================

mod r4_failures {
    use super::*;

    /// Store wrapper whose read and subscribe can be made to fail.
    struct FlakyStore {
        inner: RecordStore,
        collector: RefCountCollector,
        fail_read: Cell<bool>,
        fail_subscribe: Cell<bool>,
    }

    impl FlakyStore {
        fn new() -> Self {
            let inner = RecordStore::new();
            inner.commit(|batch| {
                batch.set("1", "name", "Alice").set("2", "name", "Bob");
            });
            Self {
                inner,
                collector: RefCountCollector::new(),
                fail_read: Cell::new(false),
                fail_subscribe: Cell::new(false),
            }
        }
    }

    impl Store for FlakyStore {
        type Fragment = Selection;

        fn read(&self, fragment: &Selection, id: &RecordId) -> Result<ReadOutcome, RelinkError> {
            if self.fail_read.get() {
                return Err(RelinkError::ReadFailed {
                    id: id.clone(),
                    reason: "offline".to_string(),
                });
            }
            self.inner.read(fragment, id)
        }

        fn canonicalize(&self, id: &RecordId) -> RecordId {
            self.inner.canonicalize(id)
        }

        fn subscribe(
            &self,
            ids: &BTreeSet<RecordId>,
            listener: Listener,
        ) -> Result<Subscription, RelinkError> {
            if self.fail_subscribe.get() {
                return Err(RelinkError::SubscribeFailed("emitter closed".to_string()));
            }
            self.inner.subscribe(ids, listener)
        }

        fn collector(&self) -> Option<&dyn ReferenceCollector> {
            Some(&self.collector)
        }
    }

    fn name() -> Selection {
        Selection::new("Name", vec![FieldSelection::scalar("name")])
    }

    /// R4.1: Read failures propagate unchanged.
    #[test]
    fn read_failure_propagates() {
        let store = Rc::new(FlakyStore::new());
        let (_, on_change) = counter();
        let mut resolver = Resolver::new(Rc::clone(&store), name(), on_change);

        store.fail_read.set(true);
        let result = resolver.resolve(&name(), "1");
        assert!(matches!(result, Err(RelinkError::ReadFailed { .. })));

        store.fail_read.set(false);
        assert!(resolver.resolve(&name(), "1").is_ok());
    }

    /// R4.2: Subscribe failures propagate and leave no counts behind.
    #[test]
    fn subscribe_failure_releases_previous_state() {
        let store = Rc::new(FlakyStore::new());
        let (_, on_change) = counter();
        let mut resolver = Resolver::new(Rc::clone(&store), name(), on_change);
        resolver.resolve(&name(), "1").expect("resolve");

        store.fail_subscribe.set(true);
        let result = resolver.resolve(&name(), "2");
        assert!(matches!(result, Err(RelinkError::SubscribeFailed(_))));
        assert!(store.collector.live_ids().is_empty());
        assert_eq!(store.inner.emitter().listener_count(), 0);

        store.fail_subscribe.set(false);
        let resolved = resolver.resolve(&name(), "2").expect("resolve");
        assert_eq!(one(&resolved).get("name"), Some(&Data::str("Bob")));
        assert_eq!(store.collector.count(&RecordId::from("2")), 1);
    }

    /// R4.3: Fragments are never required to be the store's only kind.
    #[test]
    fn fragment_capabilities_are_reported() {
        let fragment = name().plural();
        assert!(fragment.is_plural());
        assert_eq!(fragment.debug_name(), "Name");
        assert_eq!(fragment.concrete_identity(), "Name");
    }
}
