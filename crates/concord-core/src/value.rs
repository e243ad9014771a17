//! Payloads carried by features: raw values and replicated references.

use crate::id::InstanceId;
use serde::{Deserialize, Serialize};

/// A raw attribute value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// False for NaN and infinite floats, which have no wire form.
    pub fn is_finite(&self) -> bool {
        match self {
            Value::Float(x) => x.is_finite(),
            _ => true,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{:?}", s),
        }
    }
}

/// One element of a feature, in replicated terms.
///
/// Raw values travel as-is; objects travel by their [`InstanceId`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Element {
    Value(Value),
    Reference(InstanceId),
}

impl Element {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Element::Value(v) => Some(v),
            Element::Reference(_) => None,
        }
    }

    pub fn as_reference(&self) -> Option<InstanceId> {
        match self {
            Element::Reference(id) => Some(*id),
            Element::Value(_) => None,
        }
    }
}

impl From<Value> for Element {
    fn from(v: Value) -> Self {
        Element::Value(v)
    }
}

impl From<InstanceId> for Element {
    fn from(id: InstanceId) -> Self {
        Element::Reference(id)
    }
}
