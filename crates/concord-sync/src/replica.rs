//! One replica: local store, change capture and the apply pipeline.
//!
//! Local edits go through the store's edit surface; every notification it
//! returns is compiled and recorded immediately. [`Replica::send_all`]
//! publishes what has not been sent yet, [`Replica::receive_all`] applies
//! what the broker delivered.
//!
//! Received operations are applied through the store's silent primitives,
//! so they never come back through the compiler. The publisher's own frames
//! are dropped by originator.

use crate::broker::{Broker, Subscription};
use crate::config::ReplicaConfig;
use crate::error::{Result, SyncError};
use concord_change::{ChangeCompiler, CompilerConfig, History};
use concord_core::{
    Element, IdAllocator, InstanceId, ModelStore, NodeId, Notification, Operation, ReplicaStore,
    Schema,
};
use concord_message::{decode_operation, encode_operation};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Counters of one replica's pipeline.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplicaStats {
    pub sent: u64,
    pub applied: u64,
    pub echoes_dropped: u64,
    pub invalid_dropped: u64,
}

/// A replica of the shared model.
pub struct Replica<B: Broker> {
    node: NodeId,
    config: ReplicaConfig,
    ids: IdAllocator,
    store: ModelStore,
    compiler: ChangeCompiler,
    broker: Arc<B>,
    inbox: Subscription,
    /// History index of the next entry `send_all` looks at.
    cursor: usize,
    stats: ReplicaStats,
}

impl<B: Broker> Replica<B> {
    pub fn new(config: ReplicaConfig, schema: Arc<Schema>, broker: Arc<B>) -> Self {
        let node = config
            .name
            .clone()
            .map(NodeId::from_string)
            .unwrap_or_default();
        let compiler = ChangeCompiler::with_config(
            node.clone(),
            schema.clone(),
            CompilerConfig {
                clear_reconstruction: config.clear_reconstruction,
            },
        );
        let inbox = broker.subscribe(&node);
        info!(%node, "Replica created");

        Self {
            node,
            config,
            ids: IdAllocator::new(),
            store: ModelStore::new(schema),
            compiler,
            broker,
            inbox,
            cursor: 0,
            stats: ReplicaStats::default(),
        }
    }

    pub fn node(&self) -> &NodeId {
        &self.node
    }

    pub fn config(&self) -> &ReplicaConfig {
        &self.config
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    pub fn history(&self) -> &History {
        self.compiler.history()
    }

    pub fn stats(&self) -> &ReplicaStats {
        &self.stats
    }

    /// Locally recorded operations not yet published.
    pub fn unsent(&self) -> usize {
        self.history()
            .since(self.cursor)
            .iter()
            .filter(|op| self.is_outbound(op))
            .count()
    }

    // === Local edits ===

    /// Create a new object of `class` with a freshly allocated id.
    pub fn create(&mut self, class: &str) -> Result<InstanceId> {
        let id = self.ids.allocate();
        self.attach(id, class)?;
        Ok(id)
    }

    /// Attach an object under a known id.
    pub fn attach(&mut self, id: InstanceId, class: &str) -> Result<()> {
        self.store.attach(id, class)?;
        self.compiler.attached(id, class);
        Ok(())
    }

    /// Detach an object. Unlinking is recorded before the detach itself.
    ///
    /// The object is gone locally once the store detaches it, so `Detach` is
    /// recorded even when an unlink fails to compile; the first compile
    /// error is returned afterwards.
    pub fn detach(&mut self, id: InstanceId) -> Result<usize> {
        let notes = self.store.detach_object(id)?;
        self.record_detach(id, &notes)
    }

    fn record_detach(&mut self, id: InstanceId, notes: &[Notification]) -> Result<usize> {
        let mut recorded = 0;
        let mut failure = None;
        for note in notes {
            match self.compiler.notify_changed(note, &self.store) {
                Ok(Some(_)) => recorded += 1,
                Ok(None) => {}
                Err(err) => {
                    warn!(node = %self.node, %id, error = %err, "Unlink did not compile");
                    if failure.is_none() {
                        failure = Some(err);
                    }
                }
            }
        }
        self.store.prune_detachments();
        self.compiler.detached(id);

        match failure {
            Some(err) => Err(err.into()),
            None => Ok(recorded + 1),
        }
    }

    pub fn set(&mut self, id: InstanceId, feature: &str, value: Option<Element>) -> Result<usize> {
        let notes = self.store.set(id, feature, value)?;
        self.observe_all(&notes)
    }

    pub fn unset(&mut self, id: InstanceId, feature: &str) -> Result<usize> {
        let notes = self.store.unset(id, feature)?;
        self.observe_all(&notes)
    }

    pub fn add(&mut self, id: InstanceId, feature: &str, element: Element) -> Result<usize> {
        let notes = self.store.add(id, feature, element)?;
        self.observe_all(&notes)
    }

    pub fn remove(&mut self, id: InstanceId, feature: &str, element: &Element) -> Result<usize> {
        let notes = self.store.remove(id, feature, element)?;
        self.observe_all(&notes)
    }

    pub fn move_to(&mut self, id: InstanceId, feature: &str, from: usize, to: usize) -> Result<usize> {
        let notes = self.store.move_to(id, feature, from, to)?;
        self.observe_all(&notes)
    }

    pub fn add_many(&mut self, id: InstanceId, feature: &str, elements: Vec<Element>) -> Result<usize> {
        let notes = self.store.add_many(id, feature, elements)?;
        self.observe_all(&notes)
    }

    pub fn remove_many(&mut self, id: InstanceId, feature: &str, elements: &[Element]) -> Result<usize> {
        let notes = self.store.remove_many(id, feature, elements)?;
        self.observe_all(&notes)
    }

    pub fn clear(&mut self, id: InstanceId, feature: &str) -> Result<usize> {
        let notes = self.store.clear(id, feature)?;
        self.observe_all(&notes)
    }

    /// Compile one notification from an external source.
    pub fn observe(&mut self, notification: &Notification) -> Result<Option<&Operation>> {
        Ok(self.compiler.notify_changed(notification, &self.store)?)
    }

    fn observe_all(&mut self, notes: &[Notification]) -> Result<usize> {
        let mut recorded = 0;
        for note in notes {
            if self.compiler.notify_changed(note, &self.store)?.is_some() {
                recorded += 1;
            }
        }
        Ok(recorded)
    }

    // === Pipeline ===

    fn is_outbound(&self, op: &Operation) -> bool {
        op.originator() == &self.node && !op.is_invalid()
    }

    /// Publish locally produced operations not yet sent, in record order.
    ///
    /// Publishes at most `max_batch_size` operations; returns how many.
    pub fn send_all(&mut self) -> Result<usize> {
        let mut sent = 0;
        while sent < self.config.max_batch_size {
            let Some(op) = self.compiler.history().entries().get(self.cursor) else {
                break;
            };
            if !self.is_outbound(op) {
                self.cursor += 1;
                continue;
            }
            let frame = encode_operation(op)?;
            self.broker.publish(&self.node, frame)?;
            trace!(node = %self.node, op = %op, "Published operation");
            self.cursor += 1;
            sent += 1;
        }

        self.stats.sent += sent as u64;
        if sent > 0 {
            debug!(node = %self.node, sent, "Sent operations");
        }
        Ok(sent)
    }

    /// Apply every delivered frame: decode, drop echoes and Invalid, apply
    /// once, then record.
    ///
    /// A failed apply stops the drain; frames behind it stay queued.
    pub fn receive_all(&mut self) -> Result<usize> {
        let mut applied = 0;
        while let Some(delivery) = self.inbox.try_next() {
            let op = decode_operation(&delivery.frame)?;
            if op.originator() == &self.node {
                self.stats.echoes_dropped += 1;
                trace!(node = %self.node, op = %op, "Dropped echo");
                continue;
            }
            if op.is_invalid() {
                self.stats.invalid_dropped += 1;
                warn!(node = %self.node, from = %delivery.from, "Dropped invalid operation");
                continue;
            }

            if let Err(source) = op.apply(&mut self.store) {
                warn!(node = %self.node, op = %op, error = %source, "Apply failed");
                return Err(SyncError::Apply {
                    op: op.to_string(),
                    source,
                });
            }
            trace!(node = %self.node, op = %op, "Applied operation");
            self.compiler.record_remote(op);
            applied += 1;
        }

        self.stats.applied += applied as u64;
        if applied > 0 {
            debug!(node = %self.node, applied, "Received operations");
        }
        Ok(applied)
    }

    /// Whether `id` is attached in this replica.
    pub fn contains(&self, id: &InstanceId) -> bool {
        self.store.contains(id)
    }
}
