//! Value marshaling codec.
//!
//! Converts an [`RpcValue`](crate::value::RpcValue) graph into a text +
//! binary envelope and back, preserving type identity, `Map`/`Set`
//! semantics, binary payloads and error objects across the serialization
//! boundary. The text side is JSON with directive-tagged nodes; binary
//! leaves are collected into a side array in first-encountered order.

mod deserialize;
mod serialize;
pub mod types;

pub use types::{CustomFactory, MarshalType, MarshalTypeRegistry, DEFAULT_BINARY_KIND};

use crate::error::Result;
use crate::value::RpcValue;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Directive keys embedded in the `objects` text. Stable constants: both
/// ends of a connection must agree on them.
pub mod directive {
    /// Scope-qualified type tag of a class instance node.
    pub const NAME: &str = "__name__";
    /// Custom plain-value projection payload.
    pub const JSON: &str = "__JSON__";
    /// Marker object flag for a binary leaf.
    pub const BINARY: &str = "__binary__";
    /// Keys whose value was `undefined` and vanished from the text encoding.
    pub const UNDEFINED: &str = "__undefined__";
    /// Set when the node's tag was absent from the type table at
    /// serialization time.
    pub const UNREGISTERED: &str = "__unregistered__";
    /// Marker flag for an error object node.
    pub const ERROR: &str = "__error__";
    pub const ERROR_NAME: &str = "__error_name__";
    pub const ERROR_MESSAGE: &str = "__error_message__";
    pub const ERROR_STACK: &str = "__error_stack__";
    /// Entry array of a `Map`-tagged node.
    pub const MAP_ENTRIES: &str = "mapEntries";
    /// Entry array of a `Set`-tagged node.
    pub const SET_ENTRIES: &str = "setEntries";
}

/// The codec's output: a text-encodable object graph plus the binary
/// payloads it references by index. `data` order is insertion order during
/// one serialize pass and must not be reordered before readback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SerializedEnvelope {
    pub objects: String,
    #[serde(with = "hex_buffers")]
    pub data: Vec<Bytes>,
}

impl SerializedEnvelope {
    /// The envelope for `undefined`.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.data.is_empty()
    }
}

/// Binary payloads travel as hex strings on the logical JSON wire.
mod hex_buffers {
    use bytes::Bytes;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(data: &[Bytes], serializer: S) -> Result<S::Ok, S::Error> {
        let encoded: Vec<String> = data.iter().map(hex::encode).collect();
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Bytes>, D::Error> {
        let encoded = Vec::<String>::deserialize(deserializer)?;
        encoded
            .into_iter()
            .map(|s| hex::decode(&s).map(Bytes::from).map_err(D::Error::custom))
            .collect()
    }
}

/// One codec instance, bound to a marshaling scope (the interface name)
/// and a type table.
#[derive(Debug, Clone, Copy)]
pub struct RpcMarshaler<'a> {
    scope: &'a str,
    types: &'a MarshalTypeRegistry,
    strict: bool,
}

impl<'a> RpcMarshaler<'a> {
    pub fn new(scope: &'a str, types: &'a MarshalTypeRegistry) -> Self {
        Self {
            scope,
            types,
            strict: false,
        }
    }

    /// In strict mode, deserializing an unregistered type tag fails loudly
    /// instead of falling back to a plain object.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn scope(&self) -> &str {
        self.scope
    }

    /// Serialize a value graph into an envelope.
    pub fn serialize(&self, value: &RpcValue) -> Result<SerializedEnvelope> {
        serialize::Serializer::new(self.scope, self.types).run(value)
    }

    /// Deserialize an envelope back into a value graph.
    pub fn deserialize(&self, envelope: &SerializedEnvelope) -> Result<RpcValue> {
        deserialize::Deserializer::new(self.scope, self.types, self.strict).run(envelope)
    }
}
