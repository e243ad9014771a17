use async_stream::stream;
use concord_core::{Element, InstanceId, ObjectSnapshot, Schema, Value};
use concord_sync::{BrokerConfig, MemoryBroker, Replica, ReplicaConfig, Result};
use futures::stream::{Stream, StreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

type SharedReplica = Arc<Mutex<Replica<MemoryBroker>>>;

/// Statistics collected during a simulation run
#[derive(Clone, Debug)]
pub struct SimulationStats {
    pub num_replicas: usize,
    pub edits_per_replica: usize,
    pub sync_rounds: usize,
    pub operations_sent: u64,
    pub operations_applied: u64,
    pub echoes_dropped: u64,
    pub objects: usize,
    pub converged: bool,
    pub total_time: Duration,
}

impl SimulationStats {
    pub fn print(&self) {
        println!("\n╔════════════════════════════════════════════════════════════╗");
        println!("║              Simulation Statistics                          ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║  Number of Replicas:        {:>30} ║", self.num_replicas);
        println!("║  Edits per Replica:         {:>30} ║", self.edits_per_replica);
        println!("║  Sync Rounds:               {:>30} ║", self.sync_rounds);
        println!("║  Operations Sent:           {:>30} ║", self.operations_sent);
        println!("║  Operations Applied:        {:>30} ║", self.operations_applied);
        println!("║  Echoes Dropped:            {:>30} ║", self.echoes_dropped);
        println!("║  Objects per Replica:       {:>30} ║", self.objects);
        println!("║  Converged:                 {:>30} ║", self.converged);
        println!("║  Total Time:                {:>29}s ║", format!("{:.3}", self.total_time.as_secs_f64()));
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

pub fn schema() -> concord_core::Result<Arc<Schema>> {
    let schema = Schema::builder()
        .class("Graph")
        .attribute("name")
        .containment_many("vertices")
        .class("Vertex")
        .attribute("label")
        .reference("owner")
        .attribute_many("tags")
        .opposite(("Graph", "vertices"), ("Vertex", "owner"))
        .build()?;
    Ok(Arc::new(schema))
}

/// Generator of replica indices to run a receive/send round on
fn sync_schedule(num_replicas: usize, num_rounds: usize, seed: u64) -> impl Stream<Item = (usize, bool)> {
    stream! {
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..num_rounds {
            let replica = rng.gen_range(0..num_replicas);
            let publish = rng.gen_bool(0.5);
            yield (replica, publish);
        }
    }
}

/// One replica's local workload. Only touches objects the replica created,
/// plus its own entries in the shared containment slot.
async fn edit(replica: SharedReplica, graph: InstanceId, edits: usize, seed: u64) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut owned: Vec<InstanceId> = Vec::new();

    for i in 0..edits {
        let mut replica = replica.lock().await;
        let choice = if owned.is_empty() { 0 } else { rng.gen_range(0..10) };
        match choice {
            0..=2 => {
                let vertex = replica.create("Vertex")?;
                replica.add(graph, "vertices", Element::Reference(vertex))?;
                owned.push(vertex);
            }
            3..=4 => {
                let vertex = owned[rng.gen_range(0..owned.len())];
                let label = format!("v{}", rng.gen_range(0..100));
                replica.set(vertex, "label", Some(Element::Value(Value::Text(label))))?;
            }
            5..=6 => {
                let vertex = owned[rng.gen_range(0..owned.len())];
                let tag = Element::Value(Value::Text(format!("t{}", rng.gen_range(0..5))));
                replica.add(vertex, "tags", tag)?;
            }
            7 => {
                let vertex = owned[rng.gen_range(0..owned.len())];
                let tag = Element::Value(Value::Text(format!("t{}", rng.gen_range(0..5))));
                replica.remove(vertex, "tags", &tag)?;
            }
            8 => {
                let vertex = owned[rng.gen_range(0..owned.len())];
                replica.clear(vertex, "tags")?;
            }
            _ => {
                let vertex = owned.swap_remove(rng.gen_range(0..owned.len()));
                replica.detach(vertex)?;
            }
        }
        if i % 16 == 0 {
            replica.send_all()?;
        }
        drop(replica);

        if i % 100 == 0 {
            tokio::task::yield_now().await;
        }
    }
    Ok(())
}

/// Snapshot with reference slots sorted, so concurrent appends to the
/// shared containment slot compare equal.
fn normalized(replica: &Replica<MemoryBroker>) -> BTreeMap<InstanceId, ObjectSnapshot> {
    let mut snapshot = replica.store().snapshot();
    for object in snapshot.values_mut() {
        for slot in object.slots.iter_mut() {
            if slot.iter().all(|e| e.as_reference().is_some()) {
                slot.sort_by_key(Element::as_reference);
            }
        }
    }
    snapshot
}

async fn settle(broker: &MemoryBroker, replicas: &[SharedReplica]) -> Result<()> {
    loop {
        let mut sent = 0;
        for replica in replicas {
            sent += replica.lock().await.send_all()?;
        }
        broker.publish_all();
        for replica in replicas {
            replica.lock().await.receive_all()?;
        }
        if sent == 0 {
            return Ok(());
        }
    }
}

/// Randomised multi-replica run: concurrent local edits, random partial
/// sync rounds, then a final settle and convergence check.
pub async fn simulate(num_replicas: usize, edits_per_replica: usize, sync_rounds: usize, seed: u64) -> Result<SimulationStats> {
    if num_replicas == 0 {
        warn!("Simulation needs at least one replica");
        return Ok(SimulationStats {
            num_replicas,
            edits_per_replica,
            sync_rounds: 0,
            operations_sent: 0,
            operations_applied: 0,
            echoes_dropped: 0,
            objects: 0,
            converged: true,
            total_time: Duration::ZERO,
        });
    }

    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║        Replication Simulation (Async)                      ║");
    println!("║  Replicas: {} | Edits/Replica: {} | Rounds: {} ║",
             num_replicas, edits_per_replica, sync_rounds);
    println!("╚════════════════════════════════════════════════════════════╝");

    let start = Instant::now();
    let schema = schema()?;
    // Edits stage frames long before the first publish.
    let broker = Arc::new(MemoryBroker::with_config(BrokerConfig {
        capacity: 1_000_000,
        ..BrokerConfig::default()
    }));

    let replicas: Vec<SharedReplica> = (0..num_replicas)
        .map(|i| {
            let config = ReplicaConfig::builder().name(format!("replica-{}", i)).build();
            Arc::new(Mutex::new(Replica::new(config, schema.clone(), broker.clone())))
        })
        .collect();

    let graph = {
        let mut first = replicas[0].lock().await;
        let graph = first.create("Graph")?;
        first.set(graph, "name", Some(Element::Value(Value::Text("shared".into()))))?;
        graph
    };
    settle(&broker, &replicas).await?;

    println!("\n[Phase 1/3] Editing replicas concurrently...");
    let mut handles = vec![];
    for (idx, replica) in replicas.iter().enumerate() {
        let replica = Arc::clone(replica);
        handles.push(tokio::spawn(edit(replica, graph, edits_per_replica, seed + idx as u64)));
    }
    for handle in handles {
        match handle.await {
            Ok(result) => result?,
            Err(e) => warn!(error = %e, "Edit task failed"),
        }
    }
    println!("[Phase 1/3] ✓ Completed");

    println!("[Phase 2/3] Random sync rounds...");
    let mut schedule = Box::pin(sync_schedule(num_replicas, sync_rounds, seed));
    let mut rounds = 0;
    while let Some((idx, publish)) = schedule.next().await {
        {
            let mut replica = replicas[idx].lock().await;
            replica.receive_all()?;
            replica.send_all()?;
        }
        if publish {
            broker.publish_all();
        }
        rounds += 1;
        if rounds % 100 == 0 {
            println!("  Rounds completed: {}/{}", rounds, sync_rounds);
        }
    }
    println!("[Phase 2/3] ✓ Completed");

    println!("[Phase 3/3] Settling and checking convergence...");
    settle(&broker, &replicas).await?;

    let mut snapshots = Vec::with_capacity(num_replicas);
    let (mut sent, mut applied, mut echoes) = (0, 0, 0);
    for replica in &replicas {
        let replica = replica.lock().await;
        let stats = replica.stats();
        sent += stats.sent;
        applied += stats.applied;
        echoes += stats.echoes_dropped;
        snapshots.push(normalized(&replica));
    }
    let converged = snapshots.windows(2).all(|pair| pair[0] == pair[1]);
    if converged {
        info!(replicas = num_replicas, objects = snapshots[0].len(), "Replicas converged");
    } else {
        warn!(replicas = num_replicas, "Replicas diverged");
    }
    println!("[Phase 3/3] ✓ Completed");

    Ok(SimulationStats {
        num_replicas,
        edits_per_replica,
        sync_rounds: rounds,
        operations_sent: sent,
        operations_applied: applied,
        echoes_dropped: echoes,
        objects: snapshots.first().map(BTreeMap::len).unwrap_or(0),
        converged,
        total_time: start.elapsed(),
    })
}

/// Run the simulation at growing replica counts. Returns whether every run converged.
pub async fn simulate_scaling(max_replicas: usize, step_size: usize, seed: u64) -> Result<bool> {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║      Scaling Analysis - Replicas vs Convergence            ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    let mut converged = true;
    let step_size = step_size.max(1);
    let mut current = step_size;
    while current <= max_replicas {
        let stats = simulate(current, 50, current * 50, seed).await?;
        stats.print();
        converged &= stats.converged;
        current += step_size;
    }
    Ok(converged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_cluster_is_trivially_converged() {
        let stats = simulate(0, 10, 10, 1).await.unwrap();
        assert!(stats.converged);
        assert_eq!(stats.operations_sent, 0);
        assert_eq!(stats.objects, 0);
    }

    #[tokio::test]
    async fn test_small_cluster_converges() {
        let stats = simulate(2, 20, 40, 3).await.unwrap();
        assert!(stats.converged);
        assert!(stats.objects >= 1);
        assert!(stats.operations_sent > 0);
    }
}
