//! Dynamic value graph marshaled across the RPC boundary.
//!
//! `RpcValue` is the in-memory model the codec walks: JSON-like scalars and
//! containers plus the categories plain JSON cannot carry — explicit
//! `Undefined`, `Map`/`Set` semantics, binary buffers, class instances with
//! type identity, and error objects with name/message/stack.

use bytes::Bytes;
use std::collections::BTreeMap;

/// A value that can be marshaled through the codec.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcValue {
    /// Explicitly absent. Distinct from `Null`: the text encoding cannot
    /// represent it, so the codec records owning keys in a side list.
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<RpcValue>),
    /// Plain object with enumerable string keys.
    Object(BTreeMap<String, RpcValue>),
    /// Ordered map with arbitrary keys, preserved as entry pairs.
    Map(Vec<(RpcValue, RpcValue)>),
    /// Ordered set, preserved as an entry list.
    Set(Vec<RpcValue>),
    /// Raw binary buffer of a registered kind.
    Binary(BinaryValue),
    /// Class instance tagged with its unqualified type name.
    Instance(InstanceValue),
    /// Error object whose identity survives marshaling.
    Error(ErrorValue),
}

/// A binary leaf. The kind must be registered with the codec before
/// serialization; unregistered kinds are a hard marshaling error.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryValue {
    pub kind: String,
    pub bytes: Bytes,
}

/// A class instance: unqualified type name plus enumerable properties.
/// `custom` holds an explicit plain-value projection when the type exposes
/// one; it replaces the property walk on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceValue {
    pub type_name: String,
    pub properties: BTreeMap<String, RpcValue>,
    pub custom: Option<Box<RpcValue>>,
}

/// An error object. Name, message and stack are captured explicitly because
/// a plain property walk over native errors misses them.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorValue {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
    pub properties: BTreeMap<String, RpcValue>,
}

impl RpcValue {
    /// Build a plain object from key/value pairs.
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, RpcValue)>,
    {
        RpcValue::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Build a `Map` value from entry pairs.
    pub fn map<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (RpcValue, RpcValue)>,
    {
        RpcValue::Map(entries.into_iter().collect())
    }

    /// Build a `Set` value from entries.
    pub fn set<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = RpcValue>,
    {
        RpcValue::Set(entries.into_iter().collect())
    }

    /// Build a binary value of the given registered kind.
    pub fn binary(kind: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        RpcValue::Binary(BinaryValue {
            kind: kind.into(),
            bytes: bytes.into(),
        })
    }

    /// Build a class instance with the given unqualified type name.
    pub fn instance<K, I>(type_name: impl Into<String>, properties: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, RpcValue)>,
    {
        RpcValue::Instance(InstanceValue {
            type_name: type_name.into(),
            properties: properties.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            custom: None,
        })
    }

    /// Build an error value without a stack.
    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        RpcValue::Error(ErrorValue {
            name: name.into(),
            message: message.into(),
            stack: None,
            properties: BTreeMap::new(),
        })
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, RpcValue::Undefined)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RpcValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RpcValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<bool> for RpcValue {
    fn from(v: bool) -> Self {
        RpcValue::Bool(v)
    }
}

impl From<f64> for RpcValue {
    fn from(v: f64) -> Self {
        RpcValue::Number(v)
    }
}

impl From<i32> for RpcValue {
    fn from(v: i32) -> Self {
        RpcValue::Number(v as f64)
    }
}

impl From<u32> for RpcValue {
    fn from(v: u32) -> Self {
        RpcValue::Number(v as f64)
    }
}

impl From<&str> for RpcValue {
    fn from(v: &str) -> Self {
        RpcValue::String(v.to_string())
    }
}

impl From<String> for RpcValue {
    fn from(v: String) -> Self {
        RpcValue::String(v)
    }
}

impl<T: Into<RpcValue>> From<Vec<T>> for RpcValue {
    fn from(v: Vec<T>) -> Self {
        RpcValue::Array(v.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_builder() {
        let v = RpcValue::object([("a", RpcValue::from(1)), ("b", RpcValue::Undefined)]);
        match v {
            RpcValue::Object(props) => {
                assert_eq!(props.len(), 2);
                assert!(props["b"].is_undefined());
            }
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn test_from_conversions() {
        assert_eq!(RpcValue::from(true), RpcValue::Bool(true));
        assert_eq!(RpcValue::from(3), RpcValue::Number(3.0));
        assert_eq!(RpcValue::from("x"), RpcValue::String("x".into()));
        assert_eq!(
            RpcValue::from(vec![1, 2]),
            RpcValue::Array(vec![RpcValue::Number(1.0), RpcValue::Number(2.0)])
        );
    }

    #[test]
    fn test_binary_equality_is_byte_wise() {
        let a = RpcValue::binary("Bytes", vec![1u8, 2, 3]);
        let b = RpcValue::binary("Bytes", vec![1u8, 2, 3]);
        assert_eq!(a, b);
        let c = RpcValue::binary("Bytes", vec![1u8, 2, 4]);
        assert_ne!(a, c);
    }
}
