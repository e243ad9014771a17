//! Schema model and the feature classification query.
//!
//! The change compiler never looks at concrete objects to decide whether a
//! feature carries raw values or references. It asks a [`SchemaQuery`],
//! which keeps the core independent of how the host describes its classes.

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Capability of a feature as seen by the change compiler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureClass {
    /// Holds raw values.
    Scalar,
    /// Holds other objects.
    Reference,
}

/// Static schema-capability query injected into the change compiler.
pub trait SchemaQuery: Send + Sync {
    /// Classify a feature. `None` means neither scalar nor reference.
    fn classify(&self, feature: &FeatureRef) -> Option<FeatureClass>;
}

/// Names one feature of one class: the slot index within the class.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeatureRef {
    pub class: String,
    pub index: u32,
}

impl FeatureRef {
    pub fn new(class: impl Into<String>, index: u32) -> Self {
        Self {
            class: class.into(),
            index,
        }
    }
}

/// How a feature stores its contents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureKind {
    Attribute,
    Reference { containment: bool },
    /// Computed on read; never replicated.
    Derived,
}

/// One feature slot of a class.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureDef {
    pub name: String,
    pub kind: FeatureKind,
    /// Multi-valued (ordered list) rather than single-valued.
    pub many: bool,
    /// Multi-valued slot rejects duplicate entries.
    pub unique: bool,
    /// Index of the opposite feature on the referenced class.
    pub opposite: Option<u32>,
}

impl FeatureDef {
    pub fn is_reference(&self) -> bool {
        matches!(self.kind, FeatureKind::Reference { .. })
    }
}

/// A class: an ordered list of features.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDef {
    pub name: String,
    pub features: Vec<FeatureDef>,
}

impl ClassDef {
    pub fn feature(&self, index: u32) -> Option<&FeatureDef> {
        self.features.get(index as usize)
    }

    pub fn feature_index(&self, name: &str) -> Option<u32> {
        self.features
            .iter()
            .position(|f| f.name == name)
            .map(|i| i as u32)
    }
}

/// The set of classes shared by all replicas of one model.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    classes: BTreeMap<String, ClassDef>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn class(&self, name: &str) -> Option<&ClassDef> {
        self.classes.get(name)
    }

    pub fn feature(&self, feature: &FeatureRef) -> Option<&FeatureDef> {
        self.classes.get(&feature.class)?.feature(feature.index)
    }

    /// Resolve a feature name on a class into a [`FeatureRef`].
    pub fn feature_ref(&self, class: &str, name: &str) -> Result<FeatureRef> {
        let def = self
            .classes
            .get(class)
            .ok_or_else(|| StoreError::UnknownClass(class.to_string()))?;
        let index = def
            .feature_index(name)
            .ok_or_else(|| StoreError::UnknownFeature {
                class: class.to_string(),
                feature: name.to_string(),
            })?;
        Ok(FeatureRef::new(class, index))
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassDef> {
        self.classes.values()
    }
}

impl SchemaQuery for Schema {
    fn classify(&self, feature: &FeatureRef) -> Option<FeatureClass> {
        match self.feature(feature)?.kind {
            FeatureKind::Attribute => Some(FeatureClass::Scalar),
            FeatureKind::Reference { .. } => Some(FeatureClass::Reference),
            FeatureKind::Derived => None,
        }
    }
}

/// Fluent builder for [`Schema`].
///
/// Features are appended to the most recently opened class.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    classes: Vec<ClassDef>,
    opposites: Vec<((String, String), (String, String))>,
}

impl SchemaBuilder {
    pub fn class(mut self, name: impl Into<String>) -> Self {
        self.classes.push(ClassDef {
            name: name.into(),
            features: Vec::new(),
        });
        self
    }

    fn feature(mut self, name: &str, kind: FeatureKind, many: bool, unique: bool) -> Self {
        if let Some(class) = self.classes.last_mut() {
            class.features.push(FeatureDef {
                name: name.to_string(),
                kind,
                many,
                unique,
                opposite: None,
            });
        }
        self
    }

    pub fn attribute(self, name: &str) -> Self {
        self.feature(name, FeatureKind::Attribute, false, true)
    }

    /// Ordered multi-valued attribute without duplicates.
    pub fn attribute_many(self, name: &str) -> Self {
        self.feature(name, FeatureKind::Attribute, true, true)
    }

    /// Ordered multi-valued attribute that admits duplicates.
    pub fn attribute_bag(self, name: &str) -> Self {
        self.feature(name, FeatureKind::Attribute, true, false)
    }

    pub fn reference(self, name: &str) -> Self {
        self.feature(name, FeatureKind::Reference { containment: false }, false, true)
    }

    pub fn reference_many(self, name: &str) -> Self {
        self.feature(name, FeatureKind::Reference { containment: false }, true, true)
    }

    pub fn containment_many(self, name: &str) -> Self {
        self.feature(name, FeatureKind::Reference { containment: true }, true, true)
    }

    pub fn derived(self, name: &str) -> Self {
        self.feature(name, FeatureKind::Derived, false, true)
    }

    /// Pair two reference features as each other's opposite.
    pub fn opposite(
        mut self,
        (class_a, feature_a): (&str, &str),
        (class_b, feature_b): (&str, &str),
    ) -> Self {
        self.opposites.push((
            (class_a.to_string(), feature_a.to_string()),
            (class_b.to_string(), feature_b.to_string()),
        ));
        self
    }

    pub fn build(self) -> Result<Schema> {
        let mut schema = Schema {
            classes: self
                .classes
                .into_iter()
                .map(|c| (c.name.clone(), c))
                .collect(),
        };

        for ((class_a, feature_a), (class_b, feature_b)) in self.opposites {
            let a = schema.feature_ref(&class_a, &feature_a)?;
            let b = schema.feature_ref(&class_b, &feature_b)?;
            for (from, to) in [(&a, &b), (&b, &a)] {
                let def = schema
                    .classes
                    .get_mut(&from.class)
                    .and_then(|c| c.features.get_mut(from.index as usize))
                    .ok_or_else(|| StoreError::UnknownClass(from.class.clone()))?;
                if !def.is_reference() {
                    return Err(StoreError::NotAReference {
                        class: from.class.clone(),
                        feature: def.name.clone(),
                    });
                }
                def.opposite = Some(to.index);
            }
        }

        Ok(schema)
    }
}
