//! # concord-message
//!
//! Wire form of Concord operations.
//!
//! - [`UpdateMessage`]: flat projection of an operation, one type tag per variant
//! - [`encode`] / [`decode`]: lossless conversion between operations and messages
//! - [`codec`]: JSON framing for transport
//!
//! `decode(&encode(&op))` rebuilds an operation with the same type, address
//! and payload as `op`.

pub mod codec;
pub mod error;
pub mod message;

pub use codec::{decode_operation, encode_operation, from_bytes, to_bytes};
pub use error::{CodecError, Result};
pub use message::{decode, encode, AsMessage, MessageType, MessageValue, UpdateMessage};
