//! Replica store contracts and the in-memory object-graph store.
//!
//! Two traits describe what the replication core needs from a store:
//!
//! - [`ReplicaStore`]: silent mutation primitives used by `Operation::apply`.
//!   They never emit notifications, so applying a received operation cannot
//!   re-enter the change compiler.
//! - [`IdResolver`]: identifier resolution used by the change compiler.
//!
//! [`ModelStore`] implements both, and additionally offers a local edit
//! surface whose methods mutate the graph and return the notifications the
//! edit implies (including the opposite end of bidirectional references).

use crate::error::{Result, StoreError};
use crate::id::{FeatureId, InstanceId};
use crate::notification::{EventKind, Notification, Payload};
use crate::schema::{FeatureDef, FeatureKind, FeatureRef, Schema};
use crate::value::{Element, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Store-local handle of an object. Never leaves the replica.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey(u64);

/// One entry of a feature slot, in store-local terms.
#[derive(Clone, Debug, PartialEq)]
pub enum SlotValue {
    Value(Value),
    Object(ObjectKey),
}

impl SlotValue {
    pub fn as_object(&self) -> Option<ObjectKey> {
        match self {
            SlotValue::Object(k) => Some(*k),
            SlotValue::Value(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            SlotValue::Value(v) => Some(v),
            SlotValue::Object(_) => None,
        }
    }
}

/// Identifier resolution consumed by the change compiler.
pub trait IdResolver {
    /// Replicated id of an attached object.
    fn id_of(&self, key: ObjectKey) -> Option<InstanceId>;

    /// Decode a removal position into an id.
    ///
    /// Positions index the pre-removal contents of the feature most recently
    /// bulk-removed by the store.
    fn id_from_position(&self, position: usize) -> Option<InstanceId>;

    /// Last known id of an object that has been detached.
    fn detached_id(&self, key: ObjectKey) -> Option<InstanceId>;

    /// Current (remaining) contents of a feature slot.
    fn feature_contents(&self, fid: &FeatureId) -> Vec<SlotValue>;
}

/// Mutation primitives consumed by `Operation::apply`.
pub trait ReplicaStore {
    fn resolve(&self, id: &InstanceId) -> Option<ObjectKey>;

    fn contents(&self, fid: &FeatureId) -> Result<&[SlotValue]>;

    /// Whether the slot rejects duplicates.
    fn unique(&self, fid: &FeatureId) -> Result<bool>;

    /// Replace a single-valued slot. `None` empties any slot.
    fn replace(&mut self, fid: &FeatureId, value: Option<SlotValue>) -> Result<()>;

    /// Insert at `index`, or append when `None`.
    fn insert(&mut self, fid: &FeatureId, index: Option<usize>, value: SlotValue) -> Result<()>;

    /// Remove the first entry equal to `value`.
    fn remove(&mut self, fid: &FeatureId, value: &SlotValue) -> Result<bool>;

    /// Remove the entry at `index`.
    fn remove_at(&mut self, fid: &FeatureId, index: usize) -> Result<SlotValue>;

    fn attach(&mut self, id: InstanceId, class: &str) -> Result<ObjectKey>;

    /// Detach an object and unlink every reference to it.
    fn detach(&mut self, id: &InstanceId) -> Result<bool>;

    fn contains(&self, id: &InstanceId) -> bool {
        self.resolve(id).is_some()
    }
}

#[derive(Clone, Debug)]
struct ModelObject {
    id: InstanceId,
    class: String,
    slots: Vec<Vec<SlotValue>>,
}

/// Identifier-only view of one object, comparable across replicas.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectSnapshot {
    pub class: String,
    pub slots: Vec<Vec<Element>>,
}

/// In-memory object graph of one replica.
#[derive(Clone, Debug)]
pub struct ModelStore {
    schema: Arc<Schema>,
    objects: BTreeMap<ObjectKey, ModelObject>,
    keys: HashMap<InstanceId, ObjectKey>,
    /// Pending-detachment index: detached object -> last known id.
    detached: HashMap<ObjectKey, InstanceId>,
    /// Pre-removal contents of the last bulk removal.
    removal_image: Vec<SlotValue>,
    next_key: u64,
}

fn one(value: Option<SlotValue>) -> Payload {
    value.map(Payload::One).unwrap_or_default()
}

impl ModelStore {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            objects: BTreeMap::new(),
            keys: HashMap::new(),
            detached: HashMap::new(),
            removal_image: Vec::new(),
            next_key: 0,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Number of attached objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.objects.values().map(|o| o.id)
    }

    pub fn class_of(&self, id: &InstanceId) -> Option<&str> {
        let key = self.keys.get(id)?;
        self.objects.get(key).map(|o| o.class.as_str())
    }

    /// Address a feature of an attached object by name.
    pub fn feature_id(&self, id: InstanceId, feature: &str) -> Result<FeatureId> {
        let class = self
            .class_of(&id)
            .ok_or(StoreError::UnknownInstance(id))?;
        let fref = self.schema.feature_ref(class, feature)?;
        Ok(id.with_feature(fref.index))
    }

    /// Contents of a feature, in replicated terms.
    pub fn get(&self, id: InstanceId, feature: &str) -> Result<Vec<Element>> {
        let fid = self.feature_id(id, feature)?;
        Ok(self
            .slot(&fid)?
            .iter()
            .filter_map(|v| self.to_element(v))
            .collect())
    }

    /// Value of a single-valued attribute, if set.
    pub fn value(&self, id: InstanceId, feature: &str) -> Result<Option<Value>> {
        Ok(self
            .get(id, feature)?
            .into_iter()
            .next()
            .and_then(|e| e.as_value().cloned()))
    }

    /// Canonical identifier-only view of the whole graph.
    pub fn snapshot(&self) -> BTreeMap<InstanceId, ObjectSnapshot> {
        self.objects
            .values()
            .map(|o| {
                let slots = o
                    .slots
                    .iter()
                    .map(|slot| slot.iter().filter_map(|v| self.to_element(v)).collect())
                    .collect();
                (
                    o.id,
                    ObjectSnapshot {
                        class: o.class.clone(),
                        slots,
                    },
                )
            })
            .collect()
    }

    /// Forget detachments whose notifications have been compiled.
    pub fn prune_detachments(&mut self) {
        self.detached.clear();
    }

    pub fn pending_detachments(&self) -> usize {
        self.detached.len()
    }

    fn key(&self, id: &InstanceId) -> Result<ObjectKey> {
        self.keys
            .get(id)
            .copied()
            .ok_or(StoreError::UnknownInstance(*id))
    }

    fn def(&self, fid: &FeatureId) -> Result<(FeatureRef, FeatureDef)> {
        let key = self.key(&fid.instance)?;
        let class = &self.objects[&key].class;
        let fref = FeatureRef::new(class.clone(), fid.feature);
        let def = self
            .schema
            .feature(&fref)
            .cloned()
            .ok_or(StoreError::NoSuchSlot(*fid))?;
        Ok((fref, def))
    }

    fn slot(&self, fid: &FeatureId) -> Result<&Vec<SlotValue>> {
        let key = self.key(&fid.instance)?;
        self.objects[&key]
            .slots
            .get(fid.index())
            .ok_or(StoreError::NoSuchSlot(*fid))
    }

    fn slot_mut(&mut self, fid: &FeatureId) -> Result<&mut Vec<SlotValue>> {
        let key = self.key(&fid.instance)?;
        self.objects
            .get_mut(&key)
            .and_then(|o| o.slots.get_mut(fid.index()))
            .ok_or(StoreError::NoSuchSlot(*fid))
    }

    fn check(&self, fid: &FeatureId, def: &FeatureDef, value: &SlotValue) -> Result<()> {
        let expected = match (&def.kind, value) {
            (FeatureKind::Attribute, SlotValue::Value(v)) if !v.is_finite() => {
                return Err(StoreError::NonFiniteValue(*fid));
            }
            (FeatureKind::Attribute, SlotValue::Value(_)) => return Ok(()),
            (FeatureKind::Reference { .. }, SlotValue::Object(k)) => {
                if self.objects.contains_key(k) {
                    return Ok(());
                }
                "attached object"
            }
            (FeatureKind::Attribute, _) => "value",
            (FeatureKind::Reference { .. }, _) => "object",
            (FeatureKind::Derived, _) => "replicated feature",
        };
        Err(StoreError::TypeMismatch {
            fid: *fid,
            expected: expected.to_string(),
        })
    }

    fn to_slot(&self, element: &Element) -> Result<SlotValue> {
        match element {
            Element::Value(v) => Ok(SlotValue::Value(v.clone())),
            Element::Reference(id) => Ok(SlotValue::Object(self.key(id)?)),
        }
    }

    fn to_element(&self, value: &SlotValue) -> Option<Element> {
        match value {
            SlotValue::Value(v) => Some(Element::Value(v.clone())),
            SlotValue::Object(k) => self
                .id_of(*k)
                .or_else(|| self.detached_id(*k))
                .map(Element::Reference),
        }
    }

    fn many_slot(&self, fid: &FeatureId) -> Result<(FeatureRef, FeatureDef)> {
        let (fref, def) = self.def(fid)?;
        if !def.many {
            return Err(StoreError::SingleValued(*fid));
        }
        Ok((fref, def))
    }

    /// Remove every reference to `key`; returns (owner, feature, position).
    fn unlink_everywhere(&mut self, key: ObjectKey) -> Vec<(InstanceId, FeatureRef, usize)> {
        let target = SlotValue::Object(key);
        let mut unlinked = Vec::new();
        for object in self.objects.values_mut() {
            for (index, slot) in object.slots.iter_mut().enumerate() {
                while let Some(pos) = slot.iter().position(|v| *v == target) {
                    slot.remove(pos);
                    unlinked.push((
                        object.id,
                        FeatureRef::new(object.class.clone(), index as u32),
                        pos,
                    ));
                }
            }
        }
        unlinked
    }

    fn detach_key(&mut self, id: &InstanceId) -> Option<(ObjectKey, Vec<(InstanceId, FeatureRef, usize)>)> {
        let key = self.keys.remove(id)?;
        self.detached.insert(key, *id);
        self.objects.remove(&key);
        let unlinked = self.unlink_everywhere(key);
        Some((key, unlinked))
    }

    fn link_opposite(
        &mut self,
        owner: ObjectKey,
        def: &FeatureDef,
        target: ObjectKey,
        notes: &mut Vec<Notification>,
    ) -> Result<()> {
        let (Some(opposite), Some(target_id)) = (def.opposite, self.id_of(target)) else {
            return Ok(());
        };
        let fid = target_id.with_feature(opposite);
        let (fref, odef) = self.def(&fid)?;
        let value = SlotValue::Object(owner);
        let slot = self.slot_mut(&fid)?;

        if odef.many {
            if slot.contains(&value) {
                return Ok(());
            }
            slot.push(value.clone());
            let position = slot.len() - 1;
            notes.push(
                Notification::new(target_id, EventKind::Add, fref)
                    .with_new(Payload::One(value))
                    .at(position),
            );
        } else {
            let old = slot.first().cloned();
            if old.as_ref() == Some(&value) {
                return Ok(());
            }
            *slot = vec![value.clone()];
            notes.push(
                Notification::new(target_id, EventKind::Set, fref)
                    .with_old(one(old))
                    .with_new(Payload::One(value)),
            );
        }
        Ok(())
    }

    fn unlink_opposite(
        &mut self,
        owner: ObjectKey,
        def: &FeatureDef,
        target: ObjectKey,
        notes: &mut Vec<Notification>,
    ) -> Result<()> {
        let (Some(opposite), Some(target_id)) = (def.opposite, self.id_of(target)) else {
            return Ok(());
        };
        let fid = target_id.with_feature(opposite);
        let (fref, odef) = self.def(&fid)?;
        let value = SlotValue::Object(owner);
        let slot = self.slot_mut(&fid)?;

        let Some(position) = slot.iter().position(|v| *v == value) else {
            return Ok(());
        };
        slot.remove(position);
        let note = if odef.many {
            Notification::new(target_id, EventKind::Remove, fref)
                .with_old(Payload::One(value))
                .at(position)
        } else {
            // Single-valued opposite: reported as a set to nothing.
            Notification::new(target_id, EventKind::Set, fref).with_old(Payload::One(value))
        };
        notes.push(note);
        Ok(())
    }

    // === Local edits ===

    /// Set a single-valued feature. `None` sets it to nothing.
    pub fn set(
        &mut self,
        id: InstanceId,
        feature: &str,
        value: Option<Element>,
    ) -> Result<Vec<Notification>> {
        let fid = self.feature_id(id, feature)?;
        let (fref, def) = self.def(&fid)?;
        if def.many {
            return Err(StoreError::SingleValued(fid));
        }
        let new = value.map(|e| self.to_slot(&e)).transpose()?;
        if let Some(v) = &new {
            self.check(&fid, &def, v)?;
        }
        let old = self.slot(&fid)?.first().cloned();

        let mut notes = Vec::new();
        if old == new {
            notes.push(
                Notification::new(id, EventKind::Set, fref)
                    .with_old(one(old))
                    .with_new(one(new))
                    .touched(),
            );
            return Ok(notes);
        }

        *self.slot_mut(&fid)? = new.clone().into_iter().collect();
        notes.push(
            Notification::new(id, EventKind::Set, fref)
                .with_old(one(old.clone()))
                .with_new(one(new.clone())),
        );

        let owner = self.key(&id)?;
        if let Some(SlotValue::Object(k)) = old {
            self.unlink_opposite(owner, &def, k, &mut notes)?;
        }
        if let Some(SlotValue::Object(k)) = new {
            self.link_opposite(owner, &def, k, &mut notes)?;
        }
        Ok(notes)
    }

    /// Empty a feature.
    pub fn unset(&mut self, id: InstanceId, feature: &str) -> Result<Vec<Notification>> {
        let fid = self.feature_id(id, feature)?;
        let (fref, def) = self.def(&fid)?;
        let old = std::mem::take(self.slot_mut(&fid)?);

        let old_payload = if def.many {
            Payload::Many(old.clone())
        } else {
            one(old.first().cloned())
        };
        let mut notes = vec![Notification::new(id, EventKind::Unset, fref).with_old(old_payload)];

        let owner = self.key(&id)?;
        for k in old.iter().filter_map(SlotValue::as_object) {
            self.unlink_opposite(owner, &def, k, &mut notes)?;
        }
        Ok(notes)
    }

    /// Append to a multi-valued feature.
    pub fn add(&mut self, id: InstanceId, feature: &str, element: Element) -> Result<Vec<Notification>> {
        let fid = self.feature_id(id, feature)?;
        let (fref, def) = self.many_slot(&fid)?;
        let value = self.to_slot(&element)?;
        self.check(&fid, &def, &value)?;

        let slot = self.slot_mut(&fid)?;
        if (def.unique || def.is_reference()) && slot.contains(&value) {
            return Ok(Vec::new());
        }
        slot.push(value.clone());
        let position = slot.len() - 1;

        let mut notes = vec![Notification::new(id, EventKind::Add, fref)
            .with_new(Payload::One(value.clone()))
            .at(position)];
        if let SlotValue::Object(k) = value {
            let owner = self.key(&id)?;
            self.link_opposite(owner, &def, k, &mut notes)?;
        }
        Ok(notes)
    }

    /// Remove the first occurrence of an element from a multi-valued feature.
    pub fn remove(&mut self, id: InstanceId, feature: &str, element: &Element) -> Result<Vec<Notification>> {
        let fid = self.feature_id(id, feature)?;
        let (fref, def) = self.many_slot(&fid)?;
        let value = self.to_slot(element)?;

        let slot = self.slot_mut(&fid)?;
        let Some(position) = slot.iter().position(|v| *v == value) else {
            return Ok(Vec::new());
        };
        slot.remove(position);

        let mut notes = vec![Notification::new(id, EventKind::Remove, fref)
            .with_old(Payload::One(value.clone()))
            .at(position)];
        if let SlotValue::Object(k) = value {
            let owner = self.key(&id)?;
            self.unlink_opposite(owner, &def, k, &mut notes)?;
        }
        Ok(notes)
    }

    /// Move the element at `from` to the absolute position `to`.
    pub fn move_to(&mut self, id: InstanceId, feature: &str, from: usize, to: usize) -> Result<Vec<Notification>> {
        let fid = self.feature_id(id, feature)?;
        let (fref, _) = self.many_slot(&fid)?;
        let slot = self.slot_mut(&fid)?;
        let length = slot.len();
        for index in [from, to] {
            if index >= length {
                return Err(StoreError::IndexOutOfBounds { index, length });
            }
        }

        let moved = slot.remove(from);
        slot.insert(to, moved.clone());
        Ok(vec![Notification::new(id, EventKind::Move, fref)
            .with_old(Payload::Positions(vec![from]))
            .with_new(Payload::One(moved))
            .at(to)])
    }

    /// Append several elements at once.
    pub fn add_many(&mut self, id: InstanceId, feature: &str, elements: Vec<Element>) -> Result<Vec<Notification>> {
        let fid = self.feature_id(id, feature)?;
        let (fref, def) = self.many_slot(&fid)?;
        let set_like = def.unique || def.is_reference();

        let existing = self.slot(&fid)?.clone();
        let mut added: Vec<SlotValue> = Vec::with_capacity(elements.len());
        for element in &elements {
            let value = self.to_slot(element)?;
            self.check(&fid, &def, &value)?;
            if set_like && (existing.contains(&value) || added.contains(&value)) {
                continue;
            }
            added.push(value);
        }
        if added.is_empty() {
            return Ok(Vec::new());
        }

        let start = existing.len();
        self.slot_mut(&fid)?.extend(added.iter().cloned());

        let mut notes = vec![Notification::new(id, EventKind::AddMany, fref)
            .with_new(Payload::Many(added.clone()))
            .at(start)];
        let owner = self.key(&id)?;
        for k in added.iter().filter_map(SlotValue::as_object) {
            self.link_opposite(owner, &def, k, &mut notes)?;
        }
        Ok(notes)
    }

    /// Remove several elements at once, reporting their positions.
    pub fn remove_many(&mut self, id: InstanceId, feature: &str, elements: &[Element]) -> Result<Vec<Notification>> {
        let fid = self.feature_id(id, feature)?;
        let (fref, def) = self.many_slot(&fid)?;
        let wanted = elements
            .iter()
            .map(|e| self.to_slot(e))
            .collect::<Result<Vec<_>>>()?;

        let image = self.slot(&fid)?.clone();
        let mut positions: Vec<usize> = Vec::new();
        for value in &wanted {
            if let Some(p) = image
                .iter()
                .enumerate()
                .position(|(i, v)| v == value && !positions.contains(&i))
            {
                positions.push(p);
            }
        }
        if positions.is_empty() {
            return Ok(Vec::new());
        }
        positions.sort_unstable();

        let removed: Vec<SlotValue> = positions.iter().map(|&p| image[p].clone()).collect();
        *self.slot_mut(&fid)? = image
            .iter()
            .enumerate()
            .filter(|(i, _)| !positions.contains(i))
            .map(|(_, v)| v.clone())
            .collect();
        self.removal_image = image;

        let mut notes = vec![Notification::new(id, EventKind::RemoveMany, fref)
            .with_old(Payload::Many(removed.clone()))
            .with_new(Payload::Positions(positions))];
        let owner = self.key(&id)?;
        for k in removed.iter().filter_map(SlotValue::as_object) {
            self.unlink_opposite(owner, &def, k, &mut notes)?;
        }
        Ok(notes)
    }

    /// Remove every element of a multi-valued feature.
    pub fn clear(&mut self, id: InstanceId, feature: &str) -> Result<Vec<Notification>> {
        let fid = self.feature_id(id, feature)?;
        let (fref, def) = self.many_slot(&fid)?;
        let image = std::mem::take(self.slot_mut(&fid)?);
        if image.is_empty() {
            return Ok(Vec::new());
        }
        self.removal_image = image.clone();

        let mut notes =
            vec![Notification::new(id, EventKind::RemoveMany, fref).with_old(Payload::Many(image.clone()))];
        let owner = self.key(&id)?;
        for k in image.iter().filter_map(SlotValue::as_object) {
            self.unlink_opposite(owner, &def, k, &mut notes)?;
        }
        Ok(notes)
    }

    /// Detach an object, reporting each slot it is unlinked from.
    ///
    /// The id is unregistered before unlinking, so the reported removals can
    /// only be resolved through the pending-detachment index.
    pub fn detach_object(&mut self, id: InstanceId) -> Result<Vec<Notification>> {
        let (key, unlinked) = self
            .detach_key(&id)
            .ok_or(StoreError::UnknownInstance(id))?;
        Ok(unlinked
            .into_iter()
            .map(|(owner, fref, position)| {
                Notification::new(owner, EventKind::Remove, fref)
                    .with_old(Payload::object(key))
                    .at(position)
            })
            .collect())
    }
}

impl IdResolver for ModelStore {
    fn id_of(&self, key: ObjectKey) -> Option<InstanceId> {
        self.objects.get(&key).map(|o| o.id)
    }

    fn id_from_position(&self, position: usize) -> Option<InstanceId> {
        let key = self.removal_image.get(position)?.as_object()?;
        self.id_of(key).or_else(|| self.detached_id(key))
    }

    fn detached_id(&self, key: ObjectKey) -> Option<InstanceId> {
        self.detached.get(&key).copied()
    }

    fn feature_contents(&self, fid: &FeatureId) -> Vec<SlotValue> {
        self.slot(fid).cloned().unwrap_or_default()
    }
}

impl ReplicaStore for ModelStore {
    fn resolve(&self, id: &InstanceId) -> Option<ObjectKey> {
        self.keys.get(id).copied()
    }

    fn contents(&self, fid: &FeatureId) -> Result<&[SlotValue]> {
        self.slot(fid).map(Vec::as_slice)
    }

    fn unique(&self, fid: &FeatureId) -> Result<bool> {
        let (_, def) = self.def(fid)?;
        Ok(def.unique || def.is_reference())
    }

    fn replace(&mut self, fid: &FeatureId, value: Option<SlotValue>) -> Result<()> {
        let (_, def) = self.def(fid)?;
        if let Some(v) = &value {
            self.check(fid, &def, v)?;
            if def.many {
                return Err(StoreError::SingleValued(*fid));
            }
        }
        *self.slot_mut(fid)? = value.into_iter().collect();
        Ok(())
    }

    fn insert(&mut self, fid: &FeatureId, index: Option<usize>, value: SlotValue) -> Result<()> {
        let (_, def) = self.def(fid)?;
        self.check(fid, &def, &value)?;
        let slot = self.slot_mut(fid)?;
        if !def.many {
            *slot = vec![value];
            return Ok(());
        }
        let length = slot.len();
        let index = index.unwrap_or(length);
        if index > length {
            return Err(StoreError::IndexOutOfBounds { index, length });
        }
        slot.insert(index, value);
        Ok(())
    }

    fn remove(&mut self, fid: &FeatureId, value: &SlotValue) -> Result<bool> {
        let slot = self.slot_mut(fid)?;
        match slot.iter().position(|v| v == value) {
            Some(p) => {
                slot.remove(p);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn remove_at(&mut self, fid: &FeatureId, index: usize) -> Result<SlotValue> {
        let slot = self.slot_mut(fid)?;
        let length = slot.len();
        if index >= length {
            return Err(StoreError::IndexOutOfBounds { index, length });
        }
        Ok(slot.remove(index))
    }

    fn attach(&mut self, id: InstanceId, class: &str) -> Result<ObjectKey> {
        let def = self
            .schema
            .class(class)
            .ok_or_else(|| StoreError::UnknownClass(class.to_string()))?;
        if self.keys.contains_key(&id) {
            return Err(StoreError::DuplicateInstance(id));
        }

        let key = ObjectKey(self.next_key);
        self.next_key += 1;
        let object = ModelObject {
            id,
            class: def.name.clone(),
            slots: vec![Vec::new(); def.features.len()],
        };
        self.objects.insert(key, object);
        self.keys.insert(id, key);
        Ok(key)
    }

    fn detach(&mut self, id: &InstanceId) -> Result<bool> {
        // Nothing compiles notifications for a silent detach.
        Ok(match self.detach_key(id) {
            Some((key, _)) => {
                self.detached.remove(&key);
                true
            }
            None => false,
        })
    }
}
