//! The closed set of replayable changes.
//!
//! An [`Operation`] is an immutable description of one change: a target
//! address, the payload, and the node that produced it. Its effect depends
//! only on that address and payload, so applying the same operation to two
//! replicas that agree on the addressed slot leaves them agreeing again.
//!
//! Apply rules:
//! - the addressed instance must be attached, otherwise the apply fails;
//! - an empty reference, or a removed reference that no longer resolves,
//!   is a no-op;
//! - additive operations never duplicate an entry in a reference slot or a
//!   unique attribute slot, so redelivery is harmless;
//! - Attach of a known id and Detach of an unknown id are no-ops.

use crate::error::ApplyError;
use crate::id::{FeatureId, InstanceId, NodeId};
use crate::store::{ReplicaStore, SlotValue};
use crate::value::{Element, Value};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Type tag of each operation variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperationKind {
    SetValue,
    SetReference,
    Unset,
    AddValue,
    AddReference,
    RemoveValue,
    RemoveReference,
    MoveValue,
    AddManyValues,
    AddManyReferences,
    RemoveManyValues,
    RemoveManyReferences,
    Attach,
    Detach,
    Invalid,
}

impl OperationKind {
    pub const ALL: [OperationKind; 15] = [
        OperationKind::SetValue,
        OperationKind::SetReference,
        OperationKind::Unset,
        OperationKind::AddValue,
        OperationKind::AddReference,
        OperationKind::RemoveValue,
        OperationKind::RemoveReference,
        OperationKind::MoveValue,
        OperationKind::AddManyValues,
        OperationKind::AddManyReferences,
        OperationKind::RemoveManyValues,
        OperationKind::RemoveManyReferences,
        OperationKind::Attach,
        OperationKind::Detach,
        OperationKind::Invalid,
    ];
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Address and payload of one change.
#[derive(Clone, Debug, PartialEq)]
pub enum Change {
    SetValue {
        fid: FeatureId,
        value: Value,
        old_value: Option<Value>,
    },
    SetReference {
        fid: FeatureId,
        reference: Option<InstanceId>,
    },
    Unset {
        fid: FeatureId,
    },
    AddValue {
        fid: FeatureId,
        value: Value,
    },
    AddReference {
        fid: FeatureId,
        reference: Option<InstanceId>,
    },
    RemoveValue {
        fid: FeatureId,
        value: Value,
    },
    RemoveReference {
        fid: FeatureId,
        reference: Option<InstanceId>,
    },
    /// Move the element at `from` to an absolute position of an ordered
    /// feature. `element` identifies it when `from` no longer holds it.
    MoveValue {
        fid: FeatureId,
        element: Element,
        from: usize,
        position: usize,
    },
    AddManyValues {
        fid: FeatureId,
        values: Vec<Value>,
    },
    AddManyReferences {
        fid: FeatureId,
        references: Vec<InstanceId>,
    },
    RemoveManyValues {
        fid: FeatureId,
        values: Vec<Value>,
    },
    RemoveManyReferences {
        fid: FeatureId,
        references: Vec<InstanceId>,
    },
    Attach {
        id: InstanceId,
        class: String,
    },
    Detach {
        id: InstanceId,
    },
    /// Produced for features that are neither scalar nor reference.
    Invalid,
}

impl Change {
    pub fn kind(&self) -> OperationKind {
        match self {
            Change::SetValue { .. } => OperationKind::SetValue,
            Change::SetReference { .. } => OperationKind::SetReference,
            Change::Unset { .. } => OperationKind::Unset,
            Change::AddValue { .. } => OperationKind::AddValue,
            Change::AddReference { .. } => OperationKind::AddReference,
            Change::RemoveValue { .. } => OperationKind::RemoveValue,
            Change::RemoveReference { .. } => OperationKind::RemoveReference,
            Change::MoveValue { .. } => OperationKind::MoveValue,
            Change::AddManyValues { .. } => OperationKind::AddManyValues,
            Change::AddManyReferences { .. } => OperationKind::AddManyReferences,
            Change::RemoveManyValues { .. } => OperationKind::RemoveManyValues,
            Change::RemoveManyReferences { .. } => OperationKind::RemoveManyReferences,
            Change::Attach { .. } => OperationKind::Attach,
            Change::Detach { .. } => OperationKind::Detach,
            Change::Invalid => OperationKind::Invalid,
        }
    }

    /// The addressed feature, for feature-level changes.
    pub fn feature_id(&self) -> Option<FeatureId> {
        match self {
            Change::SetValue { fid, .. }
            | Change::SetReference { fid, .. }
            | Change::Unset { fid }
            | Change::AddValue { fid, .. }
            | Change::AddReference { fid, .. }
            | Change::RemoveValue { fid, .. }
            | Change::RemoveReference { fid, .. }
            | Change::MoveValue { fid, .. }
            | Change::AddManyValues { fid, .. }
            | Change::AddManyReferences { fid, .. }
            | Change::RemoveManyValues { fid, .. }
            | Change::RemoveManyReferences { fid, .. } => Some(*fid),
            Change::Attach { .. } | Change::Detach { .. } | Change::Invalid => None,
        }
    }
}

/// One replayable change, tagged with the node that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct Operation {
    originator: NodeId,
    change: Change,
}

impl Operation {
    pub fn new(originator: NodeId, change: Change) -> Self {
        Self { originator, change }
    }

    pub fn invalid(originator: NodeId) -> Self {
        Self::new(originator, Change::Invalid)
    }

    pub fn originator(&self) -> &NodeId {
        &self.originator
    }

    pub fn change(&self) -> &Change {
        &self.change
    }

    pub fn kind(&self) -> OperationKind {
        self.change.kind()
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self.change, Change::Invalid)
    }

    /// The addressed instance; `None` for Invalid.
    pub fn target_id(&self) -> Option<InstanceId> {
        match &self.change {
            Change::Attach { id, .. } | Change::Detach { id } => Some(*id),
            Change::Invalid => None,
            other => other.feature_id().map(|fid| fid.instance),
        }
    }

    /// Apply this change to a replica store.
    pub fn apply<S: ReplicaStore + ?Sized>(&self, store: &mut S) -> Result<(), ApplyError> {
        if let Some(fid) = self.change.feature_id() {
            if !store.contains(&fid.instance) {
                return Err(ApplyError::UnknownInstance(fid.instance));
            }
        }

        match &self.change {
            Change::SetValue { fid, value, .. } => {
                store.replace(fid, Some(SlotValue::Value(value.clone())))?;
            }
            Change::SetReference { fid, reference } => {
                if let Some(id) = reference {
                    let object = resolve(store, *id)?;
                    store.replace(fid, Some(object))?;
                }
            }
            Change::Unset { fid } => {
                store.replace(fid, None)?;
            }
            Change::AddValue { fid, value } => {
                let set_like = store.unique(fid)?;
                add_once(store, fid, SlotValue::Value(value.clone()), set_like)?;
            }
            Change::AddReference { fid, reference } => {
                if let Some(id) = reference {
                    let object = resolve(store, *id)?;
                    add_once(store, fid, object, true)?;
                }
            }
            Change::RemoveValue { fid, value } => {
                store.remove(fid, &SlotValue::Value(value.clone()))?;
            }
            Change::RemoveReference { fid, reference } => {
                match reference.and_then(|id| store.resolve(&id)) {
                    Some(key) => {
                        store.remove(fid, &SlotValue::Object(key))?;
                    }
                    None => debug!(%fid, ?reference, "Removed reference does not resolve"),
                }
            }
            Change::MoveValue {
                fid,
                element,
                from,
                position,
            } => {
                let target = match element {
                    Element::Value(v) => SlotValue::Value(v.clone()),
                    Element::Reference(id) => resolve(store, *id)?,
                };
                let contents = store.contents(fid)?;
                let length = contents.len();
                if *position >= length {
                    return Err(ApplyError::PositionOutOfRange {
                        fid: *fid,
                        position: *position,
                        length,
                    });
                }
                // Bags may hold equal elements; the sender's index picks one.
                let source = if contents.get(*from) == Some(&target) {
                    *from
                } else {
                    contents
                        .iter()
                        .position(|v| *v == target)
                        .ok_or(ApplyError::ElementNotFound(*fid))?
                };
                if source != *position {
                    store.remove_at(fid, source)?;
                    store.insert(fid, Some(*position), target)?;
                }
            }
            Change::AddManyValues { fid, values } => {
                let set_like = store.unique(fid)?;
                for value in values {
                    add_once(store, fid, SlotValue::Value(value.clone()), set_like)?;
                }
            }
            Change::AddManyReferences { fid, references } => {
                for id in references {
                    let object = resolve(store, *id)?;
                    add_once(store, fid, object, true)?;
                }
            }
            Change::RemoveManyValues { fid, values } => {
                for value in values {
                    store.remove(fid, &SlotValue::Value(value.clone()))?;
                }
            }
            Change::RemoveManyReferences { fid, references } => {
                for id in references {
                    if let Some(key) = store.resolve(id) {
                        store.remove(fid, &SlotValue::Object(key))?;
                    }
                }
            }
            Change::Attach { id, class } => {
                if store.contains(id) {
                    debug!(%id, "Instance already attached");
                } else {
                    store.attach(*id, class)?;
                }
            }
            Change::Detach { id } => {
                if !store.detach(id)? {
                    debug!(%id, "Instance already detached");
                }
            }
            Change::Invalid => return Err(ApplyError::InvalidOperation),
        }
        Ok(())
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.target_id() {
            Some(target) => write!(f, "{} {}{{{}}}", self.originator, self.kind(), target),
            None => write!(f, "{} {}", self.originator, self.kind()),
        }
    }
}

fn resolve<S: ReplicaStore + ?Sized>(store: &S, id: InstanceId) -> Result<SlotValue, ApplyError> {
    store
        .resolve(&id)
        .map(SlotValue::Object)
        .ok_or(ApplyError::UnknownInstance(id))
}

fn add_once<S: ReplicaStore + ?Sized>(
    store: &mut S,
    fid: &FeatureId,
    value: SlotValue,
    set_like: bool,
) -> Result<(), ApplyError> {
    if set_like && store.contents(fid)?.contains(&value) {
        return Ok(());
    }
    store.insert(fid, None, value)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use crate::store::ModelStore;
    use std::sync::Arc;

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
        store.attach(id(1), "Graph").unwrap();
        store.attach(id(2), "Vertex").unwrap();
        store.attach(id(3), "Vertex").unwrap();
        store
    }

    fn id(n: u128) -> InstanceId {
        InstanceId::from_raw(n)
    }

    fn op(change: Change) -> Operation {
        Operation::new(NodeId::from_string("node-a"), change)
    }

    #[test]
    fn test_add_reference_twice_is_idempotent() {
        let mut store = store();
        let add = op(Change::AddReference {
            fid: id(1).with_feature(1),
            reference: Some(id(2)),
        });

        add.apply(&mut store).unwrap();
        add.apply(&mut store).unwrap();

        assert_eq!(
            store.get(id(1), "vertices").unwrap(),
            vec![Element::Reference(id(2))]
        );
    }

    #[test]
    fn test_empty_reference_is_a_noop() {
        let mut store = store();
        let before = store.snapshot();

        op(Change::RemoveReference {
            fid: id(1).with_feature(1),
            reference: None,
        })
        .apply(&mut store)
        .unwrap();
        op(Change::SetReference {
            fid: id(1).with_feature(1),
            reference: None,
        })
        .apply(&mut store)
        .unwrap();

        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_set_then_unset_value() {
        let mut store = store();
        let fid = id(2).with_feature(0);

        op(Change::SetValue {
            fid,
            value: "A".into(),
            old_value: None,
        })
        .apply(&mut store)
        .unwrap();
        assert_eq!(store.value(id(2), "label").unwrap(), Some("A".into()));

        op(Change::Unset { fid }).apply(&mut store).unwrap();
        assert_eq!(store.value(id(2), "label").unwrap(), None);
    }

    #[test]
    fn test_move_validates_position() {
        let mut store = store();
        let fid = id(1).with_feature(2);
        op(Change::AddManyValues {
            fid,
            values: vec!["a".into(), "b".into(), "c".into()],
        })
        .apply(&mut store)
        .unwrap();

        let err = op(Change::MoveValue {
            fid,
            element: Element::Value("a".into()),
            from: 0,
            position: 3,
        })
        .apply(&mut store)
        .unwrap_err();
        assert!(matches!(err, ApplyError::PositionOutOfRange { length: 3, .. }));

        op(Change::MoveValue {
            fid,
            element: Element::Value("a".into()),
            from: 0,
            position: 2,
        })
        .apply(&mut store)
        .unwrap();
        assert_eq!(
            store.get(id(1), "tags").unwrap(),
            vec![
                Element::Value("b".into()),
                Element::Value("c".into()),
                Element::Value("a".into())
            ]
        );
    }

    #[test]
    fn test_move_in_bag_takes_element_at_source_index() {
        let mut store = store();
        let fid = id(1).with_feature(3);
        op(Change::AddManyValues {
            fid,
            values: vec!["a".into(), "b".into(), "a".into()],
        })
        .apply(&mut store)
        .unwrap();

        op(Change::MoveValue {
            fid,
            element: Element::Value("a".into()),
            from: 2,
            position: 0,
        })
        .apply(&mut store)
        .unwrap();
        assert_eq!(
            store.get(id(1), "weights").unwrap(),
            vec![
                Element::Value("a".into()),
                Element::Value("a".into()),
                Element::Value("b".into())
            ]
        );

        // A stale index falls back to the first equal element.
        op(Change::MoveValue {
            fid,
            element: Element::Value("b".into()),
            from: 0,
            position: 0,
        })
        .apply(&mut store)
        .unwrap();
        assert_eq!(
            store.get(id(1), "weights").unwrap(),
            vec![
                Element::Value("b".into()),
                Element::Value("a".into()),
                Element::Value("a".into())
            ]
        );
    }

    #[test]
    fn test_unknown_target_fails() {
        let mut store = store();
        let err = op(Change::AddReference {
            fid: id(1).with_feature(1),
            reference: Some(id(9)),
        })
        .apply(&mut store)
        .unwrap_err();
        assert_eq!(err, ApplyError::UnknownInstance(id(9)));

        let err = op(Change::Unset {
            fid: id(9).with_feature(0),
        })
        .apply(&mut store)
        .unwrap_err();
        assert_eq!(err, ApplyError::UnknownInstance(id(9)));
    }

    #[test]
    fn test_attach_and_detach_are_idempotent() {
        let mut store = store();
        let attach = op(Change::Attach {
            id: id(7),
            class: "Vertex".to_string(),
        });
        attach.apply(&mut store).unwrap();
        attach.apply(&mut store).unwrap();
        assert_eq!(store.len(), 4);

        let detach = op(Change::Detach { id: id(7) });
        detach.apply(&mut store).unwrap();
        detach.apply(&mut store).unwrap();
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_invalid_is_never_applied() {
        let mut store = store();
        let invalid = Operation::invalid(NodeId::from_string("node-a"));

        assert_eq!(invalid.target_id(), None);
        assert_eq!(invalid.apply(&mut store), Err(ApplyError::InvalidOperation));
    }

    #[test]
    fn test_target_id_is_addressed_instance() {
        let add = op(Change::AddReference {
            fid: id(1).with_feature(1),
            reference: Some(id(2)),
        });
        assert_eq!(add.target_id(), Some(id(1)));
        assert_eq!(add.to_string(), format!("node-a AddReference{{{}}}", id(1)));
    }
}
