//! Replica and broker configuration.

use concord_change::ClearReconstruction;

/// Configuration of one replica.
#[derive(Clone, Debug)]
pub struct ReplicaConfig {
    /// Fixed node name. A fresh ULID is drawn when unset.
    pub name: Option<String>,
    /// How bulk clears are turned into operations.
    pub clear_reconstruction: ClearReconstruction,
    /// Maximum number of operations published per `send_all` call.
    pub max_batch_size: usize,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            name: None,
            clear_reconstruction: ClearReconstruction::default(),
            max_batch_size: 100,
        }
    }
}

impl ReplicaConfig {
    pub fn builder() -> ReplicaConfigBuilder {
        ReplicaConfigBuilder::new()
    }
}

/// Builder for replica configuration.
pub struct ReplicaConfigBuilder {
    config: ReplicaConfig,
}

impl ReplicaConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ReplicaConfig::default(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    pub fn clear_reconstruction(mut self, policy: ClearReconstruction) -> Self {
        self.config.clear_reconstruction = policy;
        self
    }

    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.config.max_batch_size = size.max(1);
        self
    }

    pub fn build(self) -> ReplicaConfig {
        self.config
    }
}

impl Default for ReplicaConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the in-memory broker.
#[derive(Clone, Debug)]
pub struct BrokerConfig {
    /// Deliver each frame back to its publisher as well.
    pub deliver_to_sender: bool,
    /// Maximum number of staged, not yet delivered frames.
    pub capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            deliver_to_sender: true,
            capacity: 10_000,
        }
    }
}
