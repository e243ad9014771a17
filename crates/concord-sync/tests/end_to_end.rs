//! End-to-end replication between replicas sharing a memory broker.

use concord_core::{Element, InstanceId, OperationKind, Schema, Value};
use concord_sync::{MemoryBroker, Replica, ReplicaConfig};
use std::sync::Arc;

fn schema() -> Arc<Schema> {
    Arc::new(
        Schema::builder()
            .class("Graph")
            .attribute("name")
            .containment_many("vertices")
            .attribute_many("tags")
            .attribute_bag("weights")
            .class("Vertex")
            .attribute("label")
            .reference("owner")
            .opposite(("Graph", "vertices"), ("Vertex", "owner"))
            .build()
            .unwrap(),
    )
}

fn cluster(names: &[&str]) -> (Arc<MemoryBroker>, Vec<Replica<MemoryBroker>>) {
    let broker = Arc::new(MemoryBroker::new());
    let replicas = names
        .iter()
        .map(|name| {
            Replica::new(
                ReplicaConfig::builder().name(*name).build(),
                schema(),
                broker.clone(),
            )
        })
        .collect();
    (broker, replicas)
}

/// Send everything, deliver, apply everywhere.
fn sync(broker: &MemoryBroker, replicas: &mut [Replica<MemoryBroker>]) {
    loop {
        let mut sent = 0;
        for replica in replicas.iter_mut() {
            sent += replica.send_all().unwrap();
        }
        broker.publish_all();
        for replica in replicas.iter_mut() {
            replica.receive_all().unwrap();
        }
        if sent == 0 {
            break;
        }
    }
}

fn text(s: &str) -> Element {
    Element::Value(Value::Text(s.to_string()))
}

fn assert_converged(replicas: &[Replica<MemoryBroker>]) {
    let first = replicas[0].store().snapshot();
    for replica in &replicas[1..] {
        assert_eq!(replica.store().snapshot(), first, "{} diverged", replica.node());
    }
}

#[test]
fn test_graph_with_one_vertex_reaches_peer() {
    let (broker, mut replicas) = cluster(&["node1", "node2"]);
    let graph = replicas[0].create("Graph").unwrap();
    let vertex = replicas[0].create("Vertex").unwrap();
    replicas[0]
        .add(graph, "vertices", Element::Reference(vertex))
        .unwrap();

    sync(&broker, &mut replicas);

    let (a, b) = (&replicas[0], &replicas[1]);
    assert_eq!(b.store().len(), 2);
    assert_eq!(b.history().count(OperationKind::AddReference), 1);
    assert_eq!(a.history().count(OperationKind::SetReference), 1);
    assert_eq!(
        b.store().get(vertex, "owner").unwrap(),
        vec![Element::Reference(graph)]
    );
    assert_converged(&replicas);
}

#[test]
fn test_unset_reaches_every_replica() {
    let (broker, mut replicas) = cluster(&["a", "b", "c"]);
    let vertex = replicas[0].create("Vertex").unwrap();
    replicas[0].set(vertex, "label", Some(text("A"))).unwrap();
    sync(&broker, &mut replicas);
    assert_eq!(
        replicas[2].store().value(vertex, "label").unwrap(),
        Some(Value::Text("A".into()))
    );

    replicas[1].unset(vertex, "label").unwrap();
    sync(&broker, &mut replicas);

    for replica in &replicas {
        assert_eq!(replica.store().value(vertex, "label").unwrap(), None);
    }
}

#[test]
fn test_set_to_nothing_travels_as_unset() {
    let (broker, mut replicas) = cluster(&["a", "b"]);
    let vertex = replicas[0].create("Vertex").unwrap();
    replicas[0].set(vertex, "label", Some(text("A"))).unwrap();
    replicas[0].set(vertex, "label", None).unwrap();
    sync(&broker, &mut replicas);

    assert_eq!(replicas[1].history().count(OperationKind::Unset), 1);
    assert_eq!(replicas[1].store().value(vertex, "label").unwrap(), None);
}

#[test]
fn test_bulk_edits_replicate() {
    let (broker, mut replicas) = cluster(&["a", "b"]);
    let graph = replicas[0].create("Graph").unwrap();
    replicas[0]
        .add_many(graph, "tags", vec![text("x"), text("y"), text("z")])
        .unwrap();
    sync(&broker, &mut replicas);

    replicas[1].remove_many(graph, "tags", &[text("x"), text("z")]).unwrap();
    sync(&broker, &mut replicas);
    assert_eq!(replicas[0].store().get(graph, "tags").unwrap(), vec![text("y")]);

    replicas[0].clear(graph, "tags").unwrap();
    sync(&broker, &mut replicas);
    assert!(replicas[1].store().get(graph, "tags").unwrap().is_empty());
    assert_converged(&replicas);
}

#[test]
fn test_move_replicates_absolute_position() {
    let (broker, mut replicas) = cluster(&["a", "b"]);
    let graph = replicas[0].create("Graph").unwrap();
    replicas[0]
        .add_many(graph, "tags", vec![text("x"), text("y"), text("z")])
        .unwrap();
    replicas[0].move_to(graph, "tags", 0, 2).unwrap();
    sync(&broker, &mut replicas);

    assert_eq!(
        replicas[1].store().get(graph, "tags").unwrap(),
        vec![text("y"), text("z"), text("x")]
    );
}

#[test]
fn test_move_of_duplicate_in_bag_converges() {
    let (broker, mut replicas) = cluster(&["a", "b"]);
    let graph = replicas[0].create("Graph").unwrap();
    replicas[0]
        .add_many(graph, "weights", vec![text("a"), text("b"), text("a")])
        .unwrap();
    sync(&broker, &mut replicas);

    replicas[0].move_to(graph, "weights", 2, 0).unwrap();
    sync(&broker, &mut replicas);

    assert_eq!(
        replicas[0].store().get(graph, "weights").unwrap(),
        vec![text("a"), text("a"), text("b")]
    );
    assert_converged(&replicas);
}

#[test]
fn test_detach_unlinks_on_every_replica() {
    let (broker, mut replicas) = cluster(&["a", "b"]);
    let graph = replicas[0].create("Graph").unwrap();
    let kept = replicas[0].create("Vertex").unwrap();
    let dropped = replicas[0].create("Vertex").unwrap();
    replicas[0]
        .add_many(
            graph,
            "vertices",
            vec![Element::Reference(kept), Element::Reference(dropped)],
        )
        .unwrap();
    sync(&broker, &mut replicas);

    replicas[1].detach(dropped).unwrap();
    sync(&broker, &mut replicas);

    let a = &replicas[0];
    assert!(!a.contains(&dropped));
    assert_eq!(a.store().get(graph, "vertices").unwrap(), vec![Element::Reference(kept)]);
    assert_eq!(a.history().count(OperationKind::RemoveReference), 1);
    assert_converged(&replicas);
}

#[test]
fn test_remove_reference_replicates() {
    let (broker, mut replicas) = cluster(&["a", "b"]);
    let graph = replicas[0].create("Graph").unwrap();
    let vertex = replicas[0].create("Vertex").unwrap();
    replicas[0].add(graph, "vertices", Element::Reference(vertex)).unwrap();
    sync(&broker, &mut replicas);

    replicas[1]
        .remove(graph, "vertices", &Element::Reference(vertex))
        .unwrap();
    sync(&broker, &mut replicas);

    let a = &replicas[0];
    assert!(a.store().get(graph, "vertices").unwrap().is_empty());
    assert!(a.store().get(vertex, "owner").unwrap().is_empty());
    assert_converged(&replicas);
}

#[test]
fn test_sync_settles_without_feedback() {
    let (broker, mut replicas) = cluster(&["a", "b", "c"]);
    let graph = replicas[0].create("Graph").unwrap();
    replicas[0].set(graph, "name", Some(text("g"))).unwrap();
    sync(&broker, &mut replicas);

    let lengths: Vec<usize> = replicas.iter().map(|r| r.history().len()).collect();
    for _ in 0..3 {
        sync(&broker, &mut replicas);
    }

    assert_eq!(replicas.iter().map(|r| r.history().len()).collect::<Vec<_>>(), lengths);
    assert_eq!(lengths, vec![2, 2, 2]);
    assert_eq!(broker.staged(), 0);
    assert_eq!(replicas[0].stats().echoes_dropped, 2);
}

#[test]
fn test_fixed_ids_can_be_attached_everywhere() {
    let (broker, mut replicas) = cluster(&["a", "b"]);
    let fixed = InstanceId::from_raw(99);
    replicas[0].attach(fixed, "Graph").unwrap();
    sync(&broker, &mut replicas);

    assert!(replicas[1].contains(&fixed));
    assert!(replicas[1].attach(fixed, "Graph").is_err());
}
