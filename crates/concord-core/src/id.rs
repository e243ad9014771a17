//! Addressing primitives: replica, instance and feature identifiers.
//!
//! Identifiers are plain values. Nothing here reads ambient process state:
//! a replica owns its own [`IdAllocator`] and hands ids out explicitly.

use serde::{Deserialize, Serialize};
use ulid::{Generator, Ulid};

/// Identifier of one replica. Tags every operation with its originator.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new() -> Self {
        Self(Ulid::new().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one object instance, stable across replicas until detached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(Ulid);

impl InstanceId {
    /// Build an id from its raw 128-bit form.
    pub fn from_raw(raw: u128) -> Self {
        Self(Ulid::from(raw))
    }

    pub fn to_raw(self) -> u128 {
        u128::from(self.0)
    }

    /// Address one feature slot of this instance.
    pub fn with_feature(self, feature: u32) -> FeatureId {
        FeatureId {
            instance: self,
            feature,
        }
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Composite key addressing one feature slot on one instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeatureId {
    pub instance: InstanceId,
    pub feature: u32,
}

impl FeatureId {
    pub fn new(instance: InstanceId, feature: u32) -> Self {
        Self { instance, feature }
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    pub fn index(&self) -> usize {
        self.feature as usize
    }
}

impl std::fmt::Display for FeatureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.instance, self.feature)
    }
}

/// Per-replica source of fresh instance ids.
///
/// Ids are monotonic within one allocator and, being ULIDs, unique across
/// replicas with overwhelming probability.
pub struct IdAllocator {
    generator: Generator,
    allocated: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self {
            generator: Generator::new(),
            allocated: 0,
        }
    }

    /// Allocate the next instance id.
    pub fn allocate(&mut self) -> InstanceId {
        self.allocated += 1;
        // Overflow only happens after 2^80 ids in one millisecond.
        let ulid = self.generator.generate().unwrap_or_else(|_| Ulid::new());
        InstanceId(ulid)
    }

    /// Number of ids handed out so far.
    pub fn allocated(&self) -> u64 {
        self.allocated
    }
}

impl std::fmt::Debug for IdAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdAllocator")
            .field("allocated", &self.allocated)
            .finish_non_exhaustive()
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
