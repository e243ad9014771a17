//! Raw mutation notifications, as emitted by the object-graph store.
//!
//! Notifications describe one atomic local change in store-local terms:
//! objects appear as [`ObjectKey`] handles, not as replicated identifiers.
//! Translating them into portable operations is the change compiler's job.

use crate::id::{InstanceId, NodeId};
use crate::schema::FeatureRef;
use crate::store::{ObjectKey, SlotValue};
use crate::value::Value;

/// Kind of mutation a notification reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Set,
    Unset,
    Add,
    Remove,
    Move,
    AddMany,
    RemoveMany,
    AdapterRemoved,
    NoFeature,
    Resolve,
}

impl EventKind {
    /// Kinds that are only observed, never translated into an operation.
    pub fn is_observational(self) -> bool {
        matches!(
            self,
            EventKind::AdapterRemoved | EventKind::NoFeature | EventKind::Resolve
        )
    }
}

/// Old or new payload of a notification.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Payload {
    #[default]
    Empty,
    One(SlotValue),
    Many(Vec<SlotValue>),
    /// Positions of elements removed by a selective bulk removal.
    Positions(Vec<usize>),
}

impl Payload {
    pub fn value(v: impl Into<Value>) -> Self {
        Payload::One(SlotValue::Value(v.into()))
    }

    pub fn object(key: ObjectKey) -> Self {
        Payload::One(SlotValue::Object(key))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }
}

/// One observed mutation.
#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    /// The object whose feature changed.
    pub instance: InstanceId,
    pub kind: EventKind,
    pub feature: Option<FeatureRef>,
    pub old_value: Payload,
    pub new_value: Payload,
    pub position: Option<usize>,
    /// Pure "touch": the slot was written with its current contents.
    pub touch: bool,
    /// Set when the mutation was performed while applying an operation
    /// produced by the named node.
    pub replayed_from: Option<NodeId>,
}

impl Notification {
    pub fn new(instance: InstanceId, kind: EventKind, feature: FeatureRef) -> Self {
        Self {
            instance,
            kind,
            feature: Some(feature),
            old_value: Payload::Empty,
            new_value: Payload::Empty,
            position: None,
            touch: false,
            replayed_from: None,
        }
    }

    /// A notification that names no feature.
    pub fn featureless(instance: InstanceId, kind: EventKind) -> Self {
        Self {
            instance,
            kind,
            feature: None,
            old_value: Payload::Empty,
            new_value: Payload::Empty,
            position: None,
            touch: false,
            replayed_from: None,
        }
    }

    pub fn with_old(mut self, old: Payload) -> Self {
        self.old_value = old;
        self
    }

    pub fn with_new(mut self, new: Payload) -> Self {
        self.new_value = new;
        self
    }

    pub fn at(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }

    pub fn touched(mut self) -> Self {
        self.touch = true;
        self
    }

    pub fn replayed_from(mut self, node: NodeId) -> Self {
        self.replayed_from = Some(node);
        self
    }
}
