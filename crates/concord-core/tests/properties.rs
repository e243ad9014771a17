//! Apply properties that replication relies on.
//!
//!  - Idempotence: additive operations never duplicate an entry
//!  - Order independence: operations on disjoint slots commute

use concord_core::{Change, Element, InstanceId, ModelStore, NodeId, Operation, ReplicaStore, Schema, Value};
use proptest::prelude::*;
use std::sync::Arc;

const GRAPH: u128 = 1;
const VERTICES: [u128; 3] = [2, 3, 4];

fn id(n: u128) -> InstanceId {
    InstanceId::from_raw(n)
}

fn store() -> ModelStore {
    let schema = Schema::builder()
        .class("Graph")
        .attribute("name")
        .containment_many("vertices")
        .attribute_many("tags")
        .attribute_bag("weights")
        .class("Vertex")
        .attribute("label")
        .build()
        .unwrap();
    let mut store = ModelStore::new(Arc::new(schema));
    store.attach(id(GRAPH), "Graph").unwrap();
    for v in VERTICES {
        store.attach(id(v), "Vertex").unwrap();
    }
    store
}

fn op(change: Change) -> Operation {
    Operation::new(NodeId::from_string("origin"), change)
}

fn text() -> impl Strategy<Value = Value> {
    "[a-z]{1,4}".prop_map(Value::Text)
}

/// One operation addressing slot `slot` of the fixture.
fn slot_change(slot: usize) -> BoxedStrategy<Change> {
    let graph = id(GRAPH);
    match slot {
        0 => text()
            .prop_map(move |value| Change::SetValue {
                fid: graph.with_feature(0),
                value,
                old_value: None,
            })
            .boxed(),
        1 => prop::sample::select(VERTICES.to_vec())
            .prop_map(move |v| Change::AddReference {
                fid: graph.with_feature(1),
                reference: Some(id(v)),
            })
            .boxed(),
        2 => prop::collection::vec(text(), 1..4)
            .prop_map(move |values| Change::AddManyValues {
                fid: graph.with_feature(2),
                values,
            })
            .boxed(),
        3 => (-10i64..10)
            .prop_map(move |n| Change::AddValue {
                fid: graph.with_feature(3),
                value: Value::Int(n),
            })
            .boxed(),
        n => {
            let vertex = id(VERTICES[n % VERTICES.len()]);
            prop_oneof![
                text().prop_map(move |value| Change::SetValue {
                    fid: vertex.with_feature(0),
                    value,
                    old_value: None,
                }),
                Just(Change::Unset {
                    fid: vertex.with_feature(0),
                }),
            ]
            .boxed()
        }
    }
}

fn disjoint_pair() -> impl Strategy<Value = (Change, Change)> {
    (0usize..7, 0usize..7)
        .prop_filter("slots must differ", |(a, b)| a != b)
        .prop_flat_map(|(a, b)| (slot_change(a), slot_change(b)))
}

proptest! {
    #[test]
    fn add_reference_is_idempotent(v in prop::sample::select(VERTICES.to_vec()), times in 1usize..5) {
        let mut store = store();
        let add = op(Change::AddReference {
            fid: id(GRAPH).with_feature(1),
            reference: Some(id(v)),
        });
        for _ in 0..times {
            add.apply(&mut store).unwrap();
        }

        let vertices = store.get(id(GRAPH), "vertices").unwrap();
        prop_assert_eq!(vertices, vec![Element::Reference(id(v))]);
    }

    #[test]
    fn unique_attribute_add_is_idempotent(values in prop::collection::vec(text(), 1..5)) {
        let mut store = store();
        let add = op(Change::AddManyValues {
            fid: id(GRAPH).with_feature(2),
            values: values.clone(),
        });
        add.apply(&mut store).unwrap();
        let once = store.snapshot();
        add.apply(&mut store).unwrap();

        prop_assert_eq!(store.snapshot(), once);
    }

    #[test]
    fn disjoint_operations_commute((first, second) in disjoint_pair()) {
        let first = op(first);
        let second = op(second);

        let mut forward = store();
        first.apply(&mut forward).unwrap();
        second.apply(&mut forward).unwrap();

        let mut backward = store();
        second.apply(&mut backward).unwrap();
        first.apply(&mut backward).unwrap();

        prop_assert_eq!(forward.snapshot(), backward.snapshot());
    }
}

#[test]
fn bag_attribute_keeps_redelivered_values() {
    let mut store = store();
    let add = op(Change::AddValue {
        fid: id(GRAPH).with_feature(3),
        value: Value::Int(1),
    });
    add.apply(&mut store).unwrap();
    add.apply(&mut store).unwrap();

    assert_eq!(store.get(id(GRAPH), "weights").unwrap().len(), 2);
    assert!(store.contains(&id(GRAPH)));
}
