//! # concord-sync
//!
//! Apply pipeline for Concord replicas.
//!
//! A [`Replica`] captures local edits as operations, publishes them through
//! a [`Broker`] and applies what other replicas published. The
//! [`MemoryBroker`] is an in-process fabric with explicit delivery, for
//! tests and simulation.
//!
//! ## Example
//!
//! ```rust
//! use concord_core::{Element, Schema};
//! use concord_sync::{MemoryBroker, Replica, ReplicaConfig};
//! use std::sync::Arc;
//!
//! let schema = Arc::new(
//!     Schema::builder()
//!         .class("Graph")
//!         .containment_many("vertices")
//!         .class("Vertex")
//!         .attribute("label")
//!         .build()
//!         .unwrap(),
//! );
//! let broker = Arc::new(MemoryBroker::new());
//! let mut a = Replica::new(ReplicaConfig::builder().name("a").build(), schema.clone(), broker.clone());
//! let mut b = Replica::new(ReplicaConfig::builder().name("b").build(), schema, broker.clone());
//!
//! let graph = a.create("Graph").unwrap();
//! let vertex = a.create("Vertex").unwrap();
//! a.add(graph, "vertices", Element::Reference(vertex)).unwrap();
//!
//! a.send_all().unwrap();
//! broker.publish_all();
//! b.receive_all().unwrap();
//!
//! assert_eq!(a.store().snapshot(), b.store().snapshot());
//! ```

pub mod broker;
pub mod config;
pub mod error;
pub mod replica;

pub use broker::{Broker, Delivery, MemoryBroker, Subscription};
pub use config::{BrokerConfig, ReplicaConfig, ReplicaConfigBuilder};
pub use error::{Result, SyncError};
pub use replica::{Replica, ReplicaStats};
