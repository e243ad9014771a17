//! Error types for the replica pipeline.

use concord_change::CompileError;
use concord_core::{ApplyError, StoreError};
use concord_message::CodecError;
use thiserror::Error;

/// Errors surfaced by a [`crate::Replica`] or a broker.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to apply {op}: {source}")]
    Apply {
        op: String,
        #[source]
        source: ApplyError,
    },

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Broker is full (capacity: {capacity})")]
    BrokerFull { capacity: usize },
}

pub type Result<T> = std::result::Result<T, SyncError>;
