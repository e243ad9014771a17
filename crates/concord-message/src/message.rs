//! Flat wire projection of an operation.
//!
//! Each variant fills only the slots it needs:
//!
//! | Type | Slots |
//! |------|-------|
//! | SetValue | `featureId`, `value`, `oldValue` (optional) |
//! | SetReference / AddReference | `featureId`, `reference` |
//! | Unset | `featureId` |
//! | AddValue | `featureId`, `value` |
//! | RemoveValue | `featureId`, `oldValue` |
//! | RemoveReference | `featureId`, `oldReference` |
//! | MoveValue | `featureId`, `value` (source and target index), `oldValue` or `oldReference` (moved element) |
//! | AddMany* | `featureId`, `value` (list) |
//! | RemoveMany* | `featureId`, `oldValue` (list) |
//! | Attach | `instanceId`, `schema` |
//! | Detach | `instanceId` |
//! | Invalid | originator only |

use crate::error::{CodecError, Result};
use concord_core::{Change, Element, FeatureId, InstanceId, NodeId, Operation, Value};
use serde::{Deserialize, Serialize};

pub use concord_core::OperationKind as MessageType;

/// Payload of a value slot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum MessageValue {
    Scalar(Value),
    List(Vec<Value>),
    References(Vec<InstanceId>),
    Move { from: usize, to: usize },
}

/// Wire form of an operation. Unused slots are empty.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<InstanceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_id: Option<FeatureId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<MessageValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<MessageValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<InstanceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_reference: Option<InstanceId>,
    /// Class name of an attached instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub originator: NodeId,
}

impl UpdateMessage {
    pub fn new(message_type: MessageType, originator: NodeId) -> Self {
        Self {
            message_type,
            instance_id: None,
            feature_id: None,
            value: None,
            old_value: None,
            reference: None,
            old_reference: None,
            schema: None,
            originator,
        }
    }

    fn feature(mut self, fid: FeatureId) -> Self {
        self.feature_id = Some(fid);
        self
    }

    fn value(mut self, value: MessageValue) -> Self {
        self.value = Some(value);
        self
    }

    fn old_value(mut self, value: Option<MessageValue>) -> Self {
        self.old_value = value;
        self
    }

    /// Rebuild the operation this message describes.
    pub fn to_operation(&self) -> Result<Operation> {
        decode(self)
    }
}

/// Conversion of an operation into its wire form.
pub trait AsMessage {
    fn to_message(&self) -> UpdateMessage;
}

impl AsMessage for Operation {
    fn to_message(&self) -> UpdateMessage {
        encode(self)
    }
}

/// Project an operation onto the flat message layout.
pub fn encode(op: &Operation) -> UpdateMessage {
    let message = UpdateMessage::new(op.kind(), op.originator().clone());
    match op.change() {
        Change::SetValue {
            fid,
            value,
            old_value,
        } => message
            .feature(*fid)
            .value(MessageValue::Scalar(value.clone()))
            .old_value(old_value.clone().map(MessageValue::Scalar)),
        Change::SetReference { fid, reference } | Change::AddReference { fid, reference } => {
            let mut message = message.feature(*fid);
            message.reference = *reference;
            message
        }
        Change::Unset { fid } => message.feature(*fid),
        Change::AddValue { fid, value } => message
            .feature(*fid)
            .value(MessageValue::Scalar(value.clone())),
        Change::RemoveValue { fid, value } => message
            .feature(*fid)
            .old_value(Some(MessageValue::Scalar(value.clone()))),
        Change::RemoveReference { fid, reference } => {
            let mut message = message.feature(*fid);
            message.old_reference = *reference;
            message
        }
        Change::MoveValue {
            fid,
            element,
            from,
            position,
        } => {
            let mut message = message.feature(*fid).value(MessageValue::Move {
                from: *from,
                to: *position,
            });
            match element {
                Element::Value(v) => message.old_value = Some(MessageValue::Scalar(v.clone())),
                Element::Reference(id) => message.old_reference = Some(*id),
            }
            message
        }
        Change::AddManyValues { fid, values } => message
            .feature(*fid)
            .value(MessageValue::List(values.clone())),
        Change::AddManyReferences { fid, references } => message
            .feature(*fid)
            .value(MessageValue::References(references.clone())),
        Change::RemoveManyValues { fid, values } => message
            .feature(*fid)
            .old_value(Some(MessageValue::List(values.clone()))),
        Change::RemoveManyReferences { fid, references } => message
            .feature(*fid)
            .old_value(Some(MessageValue::References(references.clone()))),
        Change::Attach { id, class } => {
            let mut message = message;
            message.instance_id = Some(*id);
            message.schema = Some(class.clone());
            message
        }
        Change::Detach { id } => {
            let mut message = message;
            message.instance_id = Some(*id);
            message
        }
        Change::Invalid => message,
    }
}

fn require<T>(slot: Option<T>, message_type: MessageType, name: &'static str) -> Result<T> {
    slot.ok_or(CodecError::MissingSlot {
        message_type,
        slot: name,
    })
}

fn unexpected(message_type: MessageType, slot: &'static str) -> CodecError {
    CodecError::UnexpectedPayload { message_type, slot }
}

fn scalar(slot: Option<&MessageValue>, message_type: MessageType, name: &'static str) -> Result<Value> {
    match require(slot, message_type, name)? {
        MessageValue::Scalar(v) => Ok(v.clone()),
        _ => Err(unexpected(message_type, name)),
    }
}

fn list(slot: Option<&MessageValue>, message_type: MessageType, name: &'static str) -> Result<Vec<Value>> {
    match require(slot, message_type, name)? {
        MessageValue::List(values) => Ok(values.clone()),
        _ => Err(unexpected(message_type, name)),
    }
}

fn references(
    slot: Option<&MessageValue>,
    message_type: MessageType,
    name: &'static str,
) -> Result<Vec<InstanceId>> {
    match require(slot, message_type, name)? {
        MessageValue::References(ids) => Ok(ids.clone()),
        _ => Err(unexpected(message_type, name)),
    }
}

/// Reconstruct the operation from the type tag and the populated slots.
pub fn decode(message: &UpdateMessage) -> Result<Operation> {
    let ty = message.message_type;
    let fid = || require(message.feature_id, ty, "featureId");
    let instance = || require(message.instance_id, ty, "instanceId");

    let change = match ty {
        MessageType::SetValue => Change::SetValue {
            fid: fid()?,
            value: scalar(message.value.as_ref(), ty, "value")?,
            old_value: match &message.old_value {
                Some(MessageValue::Scalar(v)) => Some(v.clone()),
                Some(_) => return Err(unexpected(ty, "oldValue")),
                None => None,
            },
        },
        MessageType::SetReference => Change::SetReference {
            fid: fid()?,
            reference: message.reference,
        },
        MessageType::Unset => Change::Unset { fid: fid()? },
        MessageType::AddValue => Change::AddValue {
            fid: fid()?,
            value: scalar(message.value.as_ref(), ty, "value")?,
        },
        MessageType::AddReference => Change::AddReference {
            fid: fid()?,
            reference: message.reference,
        },
        MessageType::RemoveValue => Change::RemoveValue {
            fid: fid()?,
            value: scalar(message.old_value.as_ref(), ty, "oldValue")?,
        },
        MessageType::RemoveReference => Change::RemoveReference {
            fid: fid()?,
            reference: message.old_reference,
        },
        MessageType::MoveValue => {
            let (from, position) = match require(message.value.as_ref(), ty, "value")? {
                MessageValue::Move { from, to } => (*from, *to),
                _ => return Err(unexpected(ty, "value")),
            };
            let element = match (&message.old_value, message.old_reference) {
                (Some(MessageValue::Scalar(v)), None) => Element::Value(v.clone()),
                (None, Some(id)) => Element::Reference(id),
                (None, None) => return Err(CodecError::MissingSlot { message_type: ty, slot: "oldValue" }),
                _ => return Err(unexpected(ty, "oldValue")),
            };
            Change::MoveValue {
                fid: fid()?,
                element,
                from,
                position,
            }
        }
        MessageType::AddManyValues => Change::AddManyValues {
            fid: fid()?,
            values: list(message.value.as_ref(), ty, "value")?,
        },
        MessageType::AddManyReferences => Change::AddManyReferences {
            fid: fid()?,
            references: references(message.value.as_ref(), ty, "value")?,
        },
        MessageType::RemoveManyValues => Change::RemoveManyValues {
            fid: fid()?,
            values: list(message.old_value.as_ref(), ty, "oldValue")?,
        },
        MessageType::RemoveManyReferences => Change::RemoveManyReferences {
            fid: fid()?,
            references: references(message.old_value.as_ref(), ty, "oldValue")?,
        },
        MessageType::Attach => Change::Attach {
            id: instance()?,
            class: require(message.schema.clone(), ty, "schema")?,
        },
        MessageType::Detach => Change::Detach { id: instance()? },
        MessageType::Invalid => Change::Invalid,
    };

    Ok(Operation::new(message.originator.clone(), change))
}
