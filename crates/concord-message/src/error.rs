//! Error types for the message codec.

use crate::message::MessageType;
use thiserror::Error;

/// Errors that can occur while decoding or framing messages.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("{message_type} message is missing its {slot} slot")]
    MissingSlot {
        message_type: MessageType,
        slot: &'static str,
    },

    #[error("{message_type} message has an unexpected payload in its {slot} slot")]
    UnexpectedPayload {
        message_type: MessageType,
        slot: &'static str,
    },

    #[error("{message_type} message carries a non-finite float")]
    NonFiniteFloat { message_type: MessageType },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        CodecError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;
