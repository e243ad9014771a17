//! Byte framing of update messages.
//!
//! Messages travel as JSON documents, one message per frame. Floats are
//! written with full round-trip precision; NaN and infinities have no JSON
//! form and are refused.

use crate::error::{CodecError, Result};
use crate::message::{decode, encode, MessageValue, UpdateMessage};
use concord_core::Operation;

fn finite(slot: Option<&MessageValue>) -> bool {
    match slot {
        Some(MessageValue::Scalar(v)) => v.is_finite(),
        Some(MessageValue::List(values)) => values.iter().all(|v| v.is_finite()),
        _ => true,
    }
}

/// Serialize a message into one frame.
pub fn to_bytes(message: &UpdateMessage) -> Result<Vec<u8>> {
    if !finite(message.value.as_ref()) || !finite(message.old_value.as_ref()) {
        return Err(CodecError::NonFiniteFloat {
            message_type: message.message_type,
        });
    }
    Ok(serde_json::to_vec(message)?)
}

/// Parse one frame into a message.
pub fn from_bytes(bytes: &[u8]) -> Result<UpdateMessage> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Encode an operation straight into a frame.
pub fn encode_operation(op: &Operation) -> Result<Vec<u8>> {
    to_bytes(&encode(op))
}

/// Decode a frame straight into an operation.
pub fn decode_operation(bytes: &[u8]) -> Result<Operation> {
    decode(&from_bytes(bytes)?)
}
