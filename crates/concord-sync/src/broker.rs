//! Publish/subscribe fabric distributing encoded operations.
//!
//! The core only needs two things from a transport: a way to publish a
//! frame and an inbox per replica. [`MemoryBroker`] stages published frames
//! and fans them out on [`MemoryBroker::publish_all`], which lets tests and
//! the simulation decide exactly when delivery happens.

use crate::config::BrokerConfig;
use crate::error::{Result, SyncError};
use concord_core::NodeId;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// One encoded operation, as delivered to a subscriber.
#[derive(Clone, Debug, PartialEq)]
pub struct Delivery {
    pub from: NodeId,
    pub frame: Vec<u8>,
}

/// Inbox of one replica.
pub struct Subscription {
    node: NodeId,
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl Subscription {
    pub fn new(node: NodeId, rx: mpsc::UnboundedReceiver<Delivery>) -> Self {
        Self { node, rx }
    }

    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// Next delivered frame, without waiting.
    pub fn try_next(&mut self) -> Option<Delivery> {
        self.rx.try_recv().ok()
    }
}

/// Transport consumed by the replica pipeline.
///
/// Delivery is fire-and-forget: no ordering across publishers and no
/// persistence. Frames from one publisher must reach each subscriber in
/// publish order.
pub trait Broker: Send + Sync + 'static {
    /// Register `node` and return its inbox.
    fn subscribe(&self, node: &NodeId) -> Subscription;

    /// Hand one frame to the fabric.
    fn publish(&self, from: &NodeId, frame: Vec<u8>) -> Result<()>;
}

/// In-memory broker for tests and simulation.
pub struct MemoryBroker {
    config: BrokerConfig,
    staged: Mutex<VecDeque<Delivery>>,
    subscribers: RwLock<HashMap<NodeId, mpsc::UnboundedSender<Delivery>>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::with_config(BrokerConfig::default())
    }

    pub fn with_config(config: BrokerConfig) -> Self {
        Self {
            config,
            staged: Mutex::new(VecDeque::new()),
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Number of frames published but not yet delivered.
    pub fn staged(&self) -> usize {
        self.staged.lock().len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Deliver every staged frame to every subscriber, in publish order.
    ///
    /// Returns the number of frames fanned out.
    pub fn publish_all(&self) -> usize {
        let frames: Vec<Delivery> = self.staged.lock().drain(..).collect();
        if frames.is_empty() {
            return 0;
        }

        let mut closed = Vec::new();
        {
            let subscribers = self.subscribers.read();
            for delivery in &frames {
                for (node, tx) in subscribers.iter() {
                    if !self.config.deliver_to_sender && *node == delivery.from {
                        continue;
                    }
                    if tx.send(delivery.clone()).is_err() && !closed.contains(node) {
                        closed.push(node.clone());
                    }
                }
            }
        }

        if !closed.is_empty() {
            let mut subscribers = self.subscribers.write();
            for node in &closed {
                subscribers.remove(node);
                debug!(%node, "Dropped closed subscription");
            }
        }

        debug!(frames = frames.len(), "Published staged frames");
        frames.len()
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl Broker for MemoryBroker {
    fn subscribe(&self, node: &NodeId) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().insert(node.clone(), tx);
        Subscription::new(node.clone(), rx)
    }

    fn publish(&self, from: &NodeId, frame: Vec<u8>) -> Result<()> {
        let mut staged = self.staged.lock();
        if staged.len() >= self.config.capacity {
            return Err(SyncError::BrokerFull {
                capacity: self.config.capacity,
            });
        }
        trace!(%from, bytes = frame.len(), "Staged frame");
        staged.push_back(Delivery {
            from: from.clone(),
            frame,
        });
        Ok(())
    }
}
