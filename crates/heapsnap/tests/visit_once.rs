//! Visit-once and traversal-shape guarantees: multi-path graphs, cycles,
//! deep chains, and pass independence.

use std::collections::HashMap;
use std::sync::Mutex;

use heapsnap::test_util::GraphFixture;
use heapsnap::{
    Constant, EntityId, FieldId, HeapVerifier, ObjectScanner, ReusableSet, ScanObserver,
    ScanReason, Slot,
};

const LEFT: FieldId = FieldId(0);
const RIGHT: FieldId = FieldId(1);
const NEXT: FieldId = FieldId(2);

#[derive(Default)]
struct VisitCounter {
    visits: Mutex<HashMap<EntityId, usize>>,
}

impl ScanObserver for VisitCounter {
    fn entity_visited(&self, entity: EntityId, _reason: ScanReason) {
        *self.visits.lock().unwrap().entry(entity).or_insert(0) += 1;
    }

    fn slot_read(&self, _entity: EntityId, _slot: Slot, _value: &Constant) {}

    fn new_reachable(&self, _entity: EntityId) {}
}

#[test]
fn diamond_is_visited_once() {
    let fx = GraphFixture::new();
    let shared = fx.add_instance(&[(NEXT, Constant::Null)]);
    let left = fx.add_instance(&[(LEFT, Constant::Object(shared))]);
    let right = fx.add_instance(&[(RIGHT, Constant::Object(shared))]);

    let visited = ReusableSet::new();
    let counter = VisitCounter::default();
    let scanner = ObjectScanner::new(&fx, &fx, &visited, &counter);
    for root in [shared, left, right] {
        scanner
            .scan(&Constant::Object(root), ScanReason::Root)
            .unwrap();
    }

    let visits = counter.visits.lock().unwrap();
    assert_eq!(visits.len(), 3);
    assert!(visits.values().all(|&count| count == 1));
}

#[test]
fn cyclic_graph_converges_and_detects_cycle_breaks() {
    let fx = GraphFixture::new();
    let a = fx.add_instance(&[(NEXT, Constant::Null)]);
    let b = fx.add_instance(&[(NEXT, Constant::Object(a))]);
    fx.set_field(a, NEXT, Constant::Object(b));
    let store = fx.snapshot();

    let verifier = HeapVerifier::new(&fx, &fx, &store);
    assert!(!verifier
        .run_pass("during analysis", true)
        .unwrap()
        .requires_another_round());

    fx.set_field(b, NEXT, Constant::Null);
    let outcome = verifier.run_pass("during analysis", true).unwrap();
    assert!(outcome.requires_another_round());
    assert_eq!(outcome.report().divergences().len(), 1);
    assert_eq!(outcome.report().divergences()[0].entity, b);
}

#[test]
fn deep_chain_does_not_exhaust_the_stack() {
    let fx = GraphFixture::new();
    let mut head = fx.add_instance(&[(NEXT, Constant::Null)]);
    for _ in 0..50_000 {
        let node = fx.add_instance(&[(NEXT, Constant::Object(head))]);
        fx.unlist(head);
        head = node;
    }
    let store = fx.snapshot();

    let verifier = HeapVerifier::new(&fx, &fx, &store);
    assert!(!verifier
        .run_pass("deep chain", true)
        .unwrap()
        .requires_another_round());
}

#[test]
fn marker_reset_keeps_passes_independent() {
    let fx = GraphFixture::new();
    let a = fx.add_instance(&[(NEXT, Constant::Int(1))]);
    let store = fx.snapshot();

    let verifier = HeapVerifier::new(&fx, &fx, &store);
    assert!(!verifier
        .run_pass("first", true)
        .unwrap()
        .requires_another_round());

    // If the marker survived across passes, the mutated entity would be
    // skipped and the drift missed.
    fx.set_field(a, NEXT, Constant::Int(2));
    let outcome = verifier.run_pass("second", true).unwrap();
    assert!(outcome.requires_another_round());
    assert_eq!(outcome.report().divergences().len(), 1);
}
