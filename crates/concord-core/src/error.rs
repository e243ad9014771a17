//! Error types for the store and the operation apply path.

use crate::id::{FeatureId, InstanceId};
use thiserror::Error;

/// Errors raised by the object-graph store and the schema.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Unknown class: {0}")]
    UnknownClass(String),

    #[error("Unknown feature {feature} on class {class}")]
    UnknownFeature { class: String, feature: String },

    #[error("Feature {feature} on class {class} is not a reference")]
    NotAReference { class: String, feature: String },

    #[error("Unknown instance: {0}")]
    UnknownInstance(InstanceId),

    #[error("Instance already attached: {0}")]
    DuplicateInstance(InstanceId),

    #[error("Feature slot out of range: {0}")]
    NoSuchSlot(FeatureId),

    #[error("Type mismatch at {fid}: expected {expected}")]
    TypeMismatch { fid: FeatureId, expected: String },

    #[error("Invalid index: {index} (length: {length})")]
    IndexOutOfBounds { index: usize, length: usize },

    #[error("Non-finite float rejected at {0}")]
    NonFiniteValue(FeatureId),

    #[error("Slot {0} is single-valued")]
    SingleValued(FeatureId),
}

/// Errors raised while applying an operation to a replica.
///
/// None of these are retried: a failed apply is a local defect.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApplyError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Operation addresses unknown instance {0}")]
    UnknownInstance(InstanceId),

    #[error("Move position {position} out of range at {fid} (length: {length})")]
    PositionOutOfRange {
        fid: FeatureId,
        position: usize,
        length: usize,
    },

    #[error("Moved element not present at {0}")]
    ElementNotFound(FeatureId),

    #[error("Invalid operations cannot be applied")]
    InvalidOperation,
}

pub type Result<T> = std::result::Result<T, StoreError>;
