//! Error types for the change compiler.

use concord_core::EventKind;
use thiserror::Error;

/// A notification that breaks its contract. Aborts that one translation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("{kind:?} notification is missing its {slot}")]
    MissingPayload { kind: EventKind, slot: &'static str },

    #[error("{kind:?} notification carries an unexpected {slot}")]
    UnexpectedPayload { kind: EventKind, slot: &'static str },

    #[error("{kind:?} notification has no position")]
    MissingPosition { kind: EventKind },

    #[error("{kind:?} notification references an object with no known id")]
    UnresolvedObject { kind: EventKind },
}

pub type Result<T> = std::result::Result<T, CompileError>;
