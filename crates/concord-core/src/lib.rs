//! # concord-core
//!
//! Core types of the Concord operation-based model replication engine.
//!
//! This crate provides:
//! - Identifiers: [`NodeId`], [`InstanceId`], [`FeatureId`] and the per-replica [`IdAllocator`]
//! - The schema model and the [`SchemaQuery`] classification capability
//! - Raw mutation [`Notification`]s as emitted by a store
//! - Store contracts ([`ReplicaStore`], [`IdResolver`]) and the in-memory [`ModelStore`]
//! - The closed [`Operation`] type and its apply semantics
//!
//! ## Example
//!
//! ```rust
//! use concord_core::{Change, Element, InstanceId, ModelStore, NodeId, Operation, ReplicaStore, Schema};
//! use std::sync::Arc;
//!
//! let schema = Schema::builder()
//!     .class("Graph")
//!     .containment_many("vertices")
//!     .class("Vertex")
//!     .attribute("label")
//!     .build()
//!     .unwrap();
//! let mut store = ModelStore::new(Arc::new(schema));
//!
//! let graph = InstanceId::from_raw(1);
//! let vertex = InstanceId::from_raw(2);
//! store.attach(graph, "Graph").unwrap();
//! store.attach(vertex, "Vertex").unwrap();
//!
//! let op = Operation::new(
//!     NodeId::from_string("replica-a"),
//!     Change::AddReference { fid: graph.with_feature(0), reference: Some(vertex) },
//! );
//! op.apply(&mut store).unwrap();
//! assert_eq!(store.get(graph, "vertices").unwrap(), vec![Element::Reference(vertex)]);
//! ```

pub mod error;
pub mod id;
pub mod notification;
pub mod operation;
pub mod schema;
pub mod store;
pub mod value;

pub use error::{ApplyError, Result, StoreError};
pub use id::{FeatureId, IdAllocator, InstanceId, NodeId};
pub use notification::{EventKind, Notification, Payload};
pub use operation::{Change, Operation, OperationKind};
pub use schema::{
    ClassDef, FeatureClass, FeatureDef, FeatureKind, FeatureRef, Schema, SchemaBuilder,
    SchemaQuery,
};
pub use store::{IdResolver, ModelStore, ObjectKey, ObjectSnapshot, ReplicaStore, SlotValue};
pub use value::{Element, Value};
