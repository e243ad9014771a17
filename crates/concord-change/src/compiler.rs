//! Translation of raw store notifications into replayable operations.
//!
//! The compiler is the only place where store-local object handles are
//! turned into replicated ids. It keeps no state of its own besides the
//! history: [`ChangeCompiler::compile`] is a pure function of the
//! notification, the schema classification and the resolver's answers.

use crate::error::{CompileError, Result};
use crate::history::History;
use concord_core::{
    Change, Element, EventKind, FeatureClass, FeatureId, IdResolver, InstanceId, NodeId,
    Notification, Operation, Payload, SchemaQuery, SlotValue, Value,
};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// How a clear (bulk removal with no positions) is turned into an operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClearReconstruction {
    /// Remove exactly the elements the notification reports as removed.
    #[default]
    RemovedElements,
    /// Remove whatever the feature still contains after the clear.
    ///
    /// After a clear that is nothing, so replicas that received the
    /// resulting operation keep their elements.
    RemainingContents,
}

/// Compiler settings.
#[derive(Clone, Debug, Default)]
pub struct CompilerConfig {
    pub clear_reconstruction: ClearReconstruction,
}

/// Turns notifications into [`Operation`]s and records them.
pub struct ChangeCompiler {
    node: NodeId,
    schema: Arc<dyn SchemaQuery>,
    config: CompilerConfig,
    history: History,
}

impl ChangeCompiler {
    pub fn new(node: NodeId, schema: Arc<dyn SchemaQuery>) -> Self {
        Self::with_config(node, schema, CompilerConfig::default())
    }

    pub fn with_config(node: NodeId, schema: Arc<dyn SchemaQuery>, config: CompilerConfig) -> Self {
        Self {
            node,
            schema,
            config,
            history: History::new(),
        }
    }

    pub fn node(&self) -> &NodeId {
        &self.node
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Compile a notification and append the result to the history.
    ///
    /// Returns the recorded operation, or `None` when the notification
    /// produces nothing.
    pub fn notify_changed<R: IdResolver + ?Sized>(
        &mut self,
        notification: &Notification,
        ids: &R,
    ) -> Result<Option<&Operation>> {
        let Some(op) = self.compile(notification, ids)? else {
            return Ok(None);
        };
        debug!(node = %self.node, op = %op, "Recorded local operation");
        Ok(Some(self.history.record(op)))
    }

    /// Record the creation of an object.
    pub fn attached(&mut self, id: InstanceId, class: &str) -> &Operation {
        let op = Operation::new(
            self.node.clone(),
            Change::Attach {
                id,
                class: class.to_string(),
            },
        );
        debug!(node = %self.node, %id, class, "Recorded attach");
        self.history.record(op)
    }

    /// Record the removal of an object from the graph.
    pub fn detached(&mut self, id: InstanceId) -> &Operation {
        debug!(node = %self.node, %id, "Recorded detach");
        self.history
            .record(Operation::new(self.node.clone(), Change::Detach { id }))
    }

    /// Record an operation received from another replica after it was applied.
    pub fn record_remote(&mut self, op: Operation) -> &Operation {
        trace!(node = %self.node, op = %op, "Recorded remote operation");
        self.history.record(op)
    }

    /// Translate one notification. Never touches the history.
    pub fn compile<R: IdResolver + ?Sized>(
        &self,
        n: &Notification,
        ids: &R,
    ) -> Result<Option<Operation>> {
        if let Some(origin) = &n.replayed_from {
            if *origin == self.node {
                debug!(node = %self.node, kind = ?n.kind, "Suppressed echo of own operation");
            } else {
                trace!(node = %self.node, %origin, kind = ?n.kind, "Suppressed replayed notification");
            }
            return Ok(None);
        }
        if n.touch {
            return Ok(None);
        }
        let Some(feature) = &n.feature else {
            return Ok(None);
        };
        if n.kind.is_observational() {
            info!(node = %self.node, kind = ?n.kind, instance = %n.instance, "Observed notification");
            return Ok(None);
        }

        let fid = n.instance.with_feature(feature.index);
        let class = self.schema.classify(feature);
        let change = match n.kind {
            EventKind::Set => self.set(fid, class, n, ids)?,
            EventKind::Unset => Change::Unset { fid },
            EventKind::Add => self.add(fid, class, n, ids)?,
            EventKind::Remove => self.remove(fid, class, n, ids)?,
            EventKind::Move => self.move_value(fid, n, ids)?,
            EventKind::AddMany => self.add_many(fid, class, n, ids)?,
            EventKind::RemoveMany => self.remove_many(fid, class, n, ids)?,
            EventKind::AdapterRemoved | EventKind::NoFeature | EventKind::Resolve => {
                return Ok(None)
            }
        };
        if matches!(change, Change::Invalid) {
            warn!(node = %self.node, feature = ?feature, "Feature is neither scalar nor reference");
        }
        Ok(Some(Operation::new(self.node.clone(), change)))
    }

    fn set<R: IdResolver + ?Sized>(
        &self,
        fid: FeatureId,
        class: Option<FeatureClass>,
        n: &Notification,
        ids: &R,
    ) -> Result<Change> {
        // Setting to nothing is an unset.
        if n.new_value.is_empty() {
            return Ok(Change::Unset { fid });
        }
        let new = single(&n.new_value, n.kind, "new value")?;
        Ok(match class {
            Some(FeatureClass::Scalar) => Change::SetValue {
                fid,
                value: scalar(new, n.kind, "new value")?,
                old_value: match &n.old_value {
                    Payload::One(SlotValue::Value(v)) => Some(v.clone()),
                    _ => None,
                },
            },
            Some(FeatureClass::Reference) => Change::SetReference {
                fid,
                reference: self.reference(new, ids),
            },
            None => Change::Invalid,
        })
    }

    fn add<R: IdResolver + ?Sized>(
        &self,
        fid: FeatureId,
        class: Option<FeatureClass>,
        n: &Notification,
        ids: &R,
    ) -> Result<Change> {
        let new = single(&n.new_value, n.kind, "new value")?;
        Ok(match class {
            Some(FeatureClass::Scalar) => Change::AddValue {
                fid,
                value: scalar(new, n.kind, "new value")?,
            },
            Some(FeatureClass::Reference) => Change::AddReference {
                fid,
                reference: self.reference(new, ids),
            },
            None => Change::Invalid,
        })
    }

    fn remove<R: IdResolver + ?Sized>(
        &self,
        fid: FeatureId,
        class: Option<FeatureClass>,
        n: &Notification,
        ids: &R,
    ) -> Result<Change> {
        let old = single(&n.old_value, n.kind, "old value")?;
        Ok(match class {
            Some(FeatureClass::Scalar) => Change::RemoveValue {
                fid,
                value: scalar(old, n.kind, "old value")?,
            },
            Some(FeatureClass::Reference) => Change::RemoveReference {
                fid,
                reference: self.removed_reference(old, ids),
            },
            None => Change::Invalid,
        })
    }

    fn move_value<R: IdResolver + ?Sized>(
        &self,
        fid: FeatureId,
        n: &Notification,
        ids: &R,
    ) -> Result<Change> {
        let position = n
            .position
            .ok_or(CompileError::MissingPosition { kind: n.kind })?;
        let from = match &n.old_value {
            Payload::Positions(p) if p.len() == 1 => p[0],
            Payload::Empty => {
                return Err(CompileError::MissingPayload {
                    kind: n.kind,
                    slot: "old position",
                })
            }
            _ => {
                return Err(CompileError::UnexpectedPayload {
                    kind: n.kind,
                    slot: "old position",
                })
            }
        };
        let element = match single(&n.new_value, n.kind, "new value")? {
            SlotValue::Value(v) => Element::Value(v.clone()),
            SlotValue::Object(key) => ids
                .id_of(*key)
                .or_else(|| ids.detached_id(*key))
                .map(Element::Reference)
                .ok_or(CompileError::UnresolvedObject { kind: n.kind })?,
        };
        Ok(Change::MoveValue {
            fid,
            element,
            from,
            position,
        })
    }

    fn add_many<R: IdResolver + ?Sized>(
        &self,
        fid: FeatureId,
        class: Option<FeatureClass>,
        n: &Notification,
        ids: &R,
    ) -> Result<Change> {
        let added = many(&n.new_value, n.kind, "new value")?;
        Ok(match class {
            Some(FeatureClass::Scalar) => Change::AddManyValues {
                fid,
                values: added
                    .iter()
                    .map(|v| scalar(v, n.kind, "new value"))
                    .collect::<Result<_>>()?,
            },
            Some(FeatureClass::Reference) => {
                let references: Vec<InstanceId> =
                    added.iter().filter_map(|v| self.reference(v, ids)).collect();
                let dropped = added.len() - references.len();
                if dropped > 0 {
                    warn!(node = %self.node, %fid, dropped, "Dropped unresolved references from bulk add");
                }
                Change::AddManyReferences { fid, references }
            }
            None => Change::Invalid,
        })
    }

    fn remove_many<R: IdResolver + ?Sized>(
        &self,
        fid: FeatureId,
        class: Option<FeatureClass>,
        n: &Notification,
        ids: &R,
    ) -> Result<Change> {
        let Some(class) = class else {
            return Ok(Change::Invalid);
        };
        match &n.new_value {
            Payload::Empty => {
                let removed = match self.config.clear_reconstruction {
                    ClearReconstruction::RemovedElements => {
                        many(&n.old_value, n.kind, "old value")?.to_vec()
                    }
                    ClearReconstruction::RemainingContents => ids.feature_contents(&fid),
                };
                Ok(match class {
                    FeatureClass::Scalar => Change::RemoveManyValues {
                        fid,
                        values: removed.iter().filter_map(|v| v.as_value().cloned()).collect(),
                    },
                    FeatureClass::Reference => Change::RemoveManyReferences {
                        fid,
                        references: removed
                            .iter()
                            .filter_map(|v| self.removed_reference(v, ids))
                            .collect(),
                    },
                })
            }
            Payload::Positions(positions) => Ok(match class {
                FeatureClass::Scalar => Change::RemoveManyValues {
                    fid,
                    values: many(&n.old_value, n.kind, "old value")?
                        .iter()
                        .map(|v| scalar(v, n.kind, "old value"))
                        .collect::<Result<_>>()?,
                },
                FeatureClass::Reference => Change::RemoveManyReferences {
                    fid,
                    references: positions
                        .iter()
                        .filter_map(|p| ids.id_from_position(*p))
                        .collect(),
                },
            }),
            _ => Err(CompileError::UnexpectedPayload {
                kind: n.kind,
                slot: "new value",
            }),
        }
    }

    fn reference<R: IdResolver + ?Sized>(&self, value: &SlotValue, ids: &R) -> Option<InstanceId> {
        let id = value.as_object().and_then(|key| ids.id_of(key));
        if id.is_none() {
            warn!(node = %self.node, "Referenced object has no id");
        }
        id
    }

    /// Removed objects may already be detached; fall back to the
    /// pending-detachment index.
    fn removed_reference<R: IdResolver + ?Sized>(
        &self,
        value: &SlotValue,
        ids: &R,
    ) -> Option<InstanceId> {
        let key = value.as_object()?;
        let id = ids.id_of(key).or_else(|| ids.detached_id(key));
        if id.is_none() {
            warn!(node = %self.node, ?key, "Removed object has no id");
        }
        id
    }
}

fn single<'a>(payload: &'a Payload, kind: EventKind, slot: &'static str) -> Result<&'a SlotValue> {
    match payload {
        Payload::One(v) => Ok(v),
        Payload::Empty => Err(CompileError::MissingPayload { kind, slot }),
        _ => Err(CompileError::UnexpectedPayload { kind, slot }),
    }
}

fn many<'a>(payload: &'a Payload, kind: EventKind, slot: &'static str) -> Result<&'a [SlotValue]> {
    match payload {
        Payload::Many(vs) => Ok(vs),
        Payload::One(v) => Ok(std::slice::from_ref(v)),
        Payload::Empty => Err(CompileError::MissingPayload { kind, slot }),
        Payload::Positions(_) => Err(CompileError::UnexpectedPayload { kind, slot }),
    }
}

fn scalar(value: &SlotValue, kind: EventKind, slot: &'static str) -> Result<Value> {
    value
        .as_value()
        .cloned()
        .ok_or(CompileError::UnexpectedPayload { kind, slot })
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_core::{ModelStore, ReplicaStore, Schema};

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::builder()
                .class("Graph")
                .attribute("name")
                .containment_many("vertices")
                .attribute_many("tags")
                .derived("size")
                .class("Vertex")
                .attribute("label")
                .reference("owner")
                .opposite(("Graph", "vertices"), ("Vertex", "owner"))
                .build()
                .unwrap(),
        )
    }

    fn id(n: u128) -> InstanceId {
        InstanceId::from_raw(n)
    }

    fn setup() -> (ModelStore, ChangeCompiler) {
        let schema = schema();
        let mut store = ModelStore::new(schema.clone());
        store.attach(id(1), "Graph").unwrap();
        store.attach(id(2), "Vertex").unwrap();
        store.attach(id(3), "Vertex").unwrap();
        (store, ChangeCompiler::new(NodeId::from_string("a"), schema))
    }

    fn compile_all(
        compiler: &mut ChangeCompiler,
        store: &ModelStore,
        notes: &[Notification],
    ) -> Vec<Change> {
        notes
            .iter()
            .filter_map(|n| compiler.notify_changed(n, store).unwrap().cloned())
            .map(|op| op.change().clone())
            .collect()
    }

    #[test]
    fn test_set_value_carries_old_value() {
        let (mut store, mut compiler) = setup();
        store.set(id(2), "label", Some(Element::Value("A".into()))).unwrap();
        let notes = store.set(id(2), "label", Some(Element::Value("B".into()))).unwrap();

        let changes = compile_all(&mut compiler, &store, &notes);
        assert_eq!(
            changes,
            vec![Change::SetValue {
                fid: id(2).with_feature(0),
                value: "B".into(),
                old_value: Some("A".into()),
            }]
        );
    }

    #[test]
    fn test_bulk_add_drops_unresolved_references() {
        let (mut store, compiler) = setup();
        let gone = store.resolve(&id(2)).unwrap();
        let kept = store.resolve(&id(3)).unwrap();
        store.detach(&id(2)).unwrap();

        let vertices = schema().feature_ref("Graph", "vertices").unwrap();
        let n = Notification::new(id(1), EventKind::AddMany, vertices).with_new(Payload::Many(vec![
            SlotValue::Object(gone),
            SlotValue::Object(kept),
        ]));
        let op = compiler.compile(&n, &store).unwrap().unwrap();
        assert_eq!(
            op.change(),
            &Change::AddManyReferences {
                fid: id(1).with_feature(1),
                references: vec![id(3)],
            }
        );
    }

    #[test]
    fn test_set_to_nothing_is_unset() {
        let (mut store, mut compiler) = setup();
        store.set(id(2), "label", Some(Element::Value("A".into()))).unwrap();
        let notes = store.set(id(2), "label", None).unwrap();

        let changes = compile_all(&mut compiler, &store, &notes);
        assert_eq!(changes, vec![Change::Unset { fid: id(2).with_feature(0) }]);
    }

    #[test]
    fn test_add_reference_emits_both_ends() {
        let (mut store, mut compiler) = setup();
        let notes = store.add(id(1), "vertices", Element::Reference(id(2))).unwrap();

        let changes = compile_all(&mut compiler, &store, &notes);
        assert_eq!(
            changes,
            vec![
                Change::AddReference {
                    fid: id(1).with_feature(1),
                    reference: Some(id(2)),
                },
                Change::SetReference {
                    fid: id(2).with_feature(1),
                    reference: Some(id(1)),
                },
            ]
        );
        assert_eq!(compiler.history().len(), 2);
    }

    #[test]
    fn test_touch_and_replay_produce_nothing() {
        let (mut store, mut compiler) = setup();
        store.set(id(2), "label", Some(Element::Value("A".into()))).unwrap();
        let touch = store.set(id(2), "label", Some(Element::Value("A".into()))).unwrap();
        assert!(compile_all(&mut compiler, &store, &touch).is_empty());

        let echo = Notification::new(id(2), EventKind::Set, schema().feature_ref("Vertex", "label").unwrap())
            .with_new(Payload::value("C"))
            .replayed_from(NodeId::from_string("a"));
        let replay = echo.clone().replayed_from(NodeId::from_string("b"));
        assert!(compiler.notify_changed(&echo, &store).unwrap().is_none());
        assert!(compiler.notify_changed(&replay, &store).unwrap().is_none());
        assert!(compiler.history().is_empty());
    }

    #[test]
    fn test_observational_and_featureless_produce_nothing() {
        let (store, mut compiler) = setup();
        let fref = schema().feature_ref("Graph", "name").unwrap();

        let resolve = Notification::new(id(1), EventKind::Resolve, fref);
        let featureless = Notification::featureless(id(1), EventKind::Set).with_new(Payload::value("x"));
        assert!(compiler.notify_changed(&resolve, &store).unwrap().is_none());
        assert!(compiler.notify_changed(&featureless, &store).unwrap().is_none());
    }

    #[test]
    fn test_derived_feature_compiles_to_invalid() {
        let (store, mut compiler) = setup();
        let fref = schema().feature_ref("Graph", "size").unwrap();
        let n = Notification::new(id(1), EventKind::Set, fref).with_new(Payload::value(3));

        let op = compiler.notify_changed(&n, &store).unwrap().unwrap();
        assert!(op.is_invalid());
    }

    #[test]
    fn test_detach_removal_resolves_through_index() {
        let (mut store, mut compiler) = setup();
        store.add(id(1), "vertices", Element::Reference(id(2))).unwrap();

        let notes = store.detach_object(id(2)).unwrap();
        let changes = compile_all(&mut compiler, &store, &notes);

        assert_eq!(
            changes,
            vec![Change::RemoveReference {
                fid: id(1).with_feature(1),
                reference: Some(id(2)),
            }]
        );
    }

    #[test]
    fn test_selective_remove_many_decodes_positions() {
        let (mut store, mut compiler) = setup();
        store
            .add_many(id(1), "vertices", vec![Element::Reference(id(2)), Element::Reference(id(3))])
            .unwrap();

        let notes = store.remove_many(id(1), "vertices", &[Element::Reference(id(3))]).unwrap();
        let changes = compile_all(&mut compiler, &store, &notes[..1]);

        assert_eq!(
            changes,
            vec![Change::RemoveManyReferences {
                fid: id(1).with_feature(1),
                references: vec![id(3)],
            }]
        );
    }

    #[test]
    fn test_clear_reconstruction_policies() {
        let (mut store, compiler) = setup();
        store
            .add_many(id(1), "tags", vec![Element::Value("x".into()), Element::Value("y".into())])
            .unwrap();
        let notes = store.clear(id(1), "tags").unwrap();

        let removed = compiler.compile(&notes[0], &store).unwrap().unwrap();
        assert_eq!(
            removed.change(),
            &Change::RemoveManyValues {
                fid: id(1).with_feature(2),
                values: vec!["x".into(), "y".into()],
            }
        );

        let remaining = ChangeCompiler::with_config(
            NodeId::from_string("a"),
            schema(),
            CompilerConfig {
                clear_reconstruction: ClearReconstruction::RemainingContents,
            },
        );
        let op = remaining.compile(&notes[0], &store).unwrap().unwrap();
        assert_eq!(
            op.change(),
            &Change::RemoveManyValues {
                fid: id(1).with_feature(2),
                values: vec![],
            }
        );
    }

    #[test]
    fn test_move_uses_absolute_position() {
        let (mut store, mut compiler) = setup();
        store
            .add_many(
                id(1),
                "tags",
                vec![
                    Element::Value("x".into()),
                    Element::Value("y".into()),
                    Element::Value("z".into()),
                ],
            )
            .unwrap();
        let notes = store.move_to(id(1), "tags", 2, 0).unwrap();

        let changes = compile_all(&mut compiler, &store, &notes);
        assert_eq!(
            changes,
            vec![Change::MoveValue {
                fid: id(1).with_feature(2),
                element: Element::Value("z".into()),
                from: 2,
                position: 0,
            }]
        );
    }

    #[test]
    fn test_missing_payload_is_an_error() {
        let (store, compiler) = setup();
        let fref = schema().feature_ref("Graph", "tags").unwrap();
        let n = Notification::new(id(1), EventKind::Add, fref.clone());
        assert_eq!(
            compiler.compile(&n, &store).unwrap_err(),
            CompileError::MissingPayload {
                kind: EventKind::Add,
                slot: "new value",
            }
        );

        let moved = Notification::new(id(1), EventKind::Move, fref).with_new(Payload::value("x"));
        assert_eq!(
            compiler.compile(&moved, &store).unwrap_err(),
            CompileError::MissingPosition { kind: EventKind::Move }
        );
    }

    #[test]
    fn test_attach_and_detach_are_recorded() {
        let (_, mut compiler) = setup();
        compiler.attached(id(9), "Vertex");
        compiler.detached(id(9));

        let kinds: Vec<_> = compiler.history().iter().map(Operation::kind).collect();
        assert_eq!(
            kinds,
            vec![concord_core::OperationKind::Attach, concord_core::OperationKind::Detach]
        );
    }
}
