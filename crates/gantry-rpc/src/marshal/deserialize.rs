//! Envelope deserializer: bottom-up reconstruction of a value graph.

use super::directive;
use super::types::MarshalTypeRegistry;
use super::SerializedEnvelope;
use crate::error::{Result, RpcError};
use crate::value::{BinaryValue, ErrorValue, InstanceValue, RpcValue};
use bytes::Bytes;
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;

/// Keys consumed by the codec itself; never copied into properties.
const DIRECTIVE_KEYS: &[&str] = &[
    directive::NAME,
    directive::JSON,
    directive::BINARY,
    directive::UNDEFINED,
    directive::UNREGISTERED,
    directive::ERROR,
    directive::ERROR_NAME,
    directive::ERROR_MESSAGE,
    directive::ERROR_STACK,
    directive::MAP_ENTRIES,
    directive::SET_ENTRIES,
];

pub(super) struct Deserializer<'a> {
    scope: &'a str,
    types: &'a MarshalTypeRegistry,
    strict: bool,
    data: &'a [Bytes],
}

impl<'a> Deserializer<'a> {
    pub(super) fn new(scope: &'a str, types: &'a MarshalTypeRegistry, strict: bool) -> Self {
        Self {
            scope,
            types,
            strict,
            data: &[],
        }
    }

    pub(super) fn run(mut self, envelope: &'a SerializedEnvelope) -> Result<RpcValue> {
        if envelope.objects.is_empty() {
            return Ok(RpcValue::Undefined);
        }
        self.data = &envelope.data;
        let tree: Json = serde_json::from_str(&envelope.objects)?;
        self.walk(&tree)
    }

    fn walk(&self, node: &Json) -> Result<RpcValue> {
        match node {
            Json::Null => Ok(RpcValue::Null),
            Json::Bool(b) => Ok(RpcValue::Bool(*b)),
            Json::Number(n) => n
                .as_f64()
                .map(RpcValue::Number)
                .ok_or_else(|| RpcError::marshal(format!("unreadable number: {n}"))),
            Json::String(s) => Ok(RpcValue::String(s.clone())),
            Json::Array(items) => {
                let decoded: Result<Vec<RpcValue>> = items.iter().map(|v| self.walk(v)).collect();
                Ok(RpcValue::Array(decoded?))
            }
            Json::Object(map) => self.walk_object(map),
        }
    }

    fn walk_object(&self, map: &Map<String, Json>) -> Result<RpcValue> {
        if map.contains_key(directive::BINARY) {
            return self.decode_binary(map);
        }
        if let Some(name) = map.get(directive::NAME).and_then(Json::as_str) {
            return self.decode_tagged(name, map);
        }
        Ok(RpcValue::Object(self.decode_props(map)?))
    }

    fn decode_binary(&self, map: &Map<String, Json>) -> Result<RpcValue> {
        let type_index = require_index(map, "type")?;
        let data_index = require_index(map, "index")?;
        let size = require_index(map, "size")?;

        let kind = self
            .types
            .binary_kind(type_index)
            .ok_or_else(|| RpcError::marshal(format!("unknown binary type index: {type_index}")))?;
        let bytes = self.data.get(data_index).ok_or_else(|| {
            RpcError::marshal(format!(
                "binary data index {data_index} out of range ({} buffers)",
                self.data.len()
            ))
        })?;
        if bytes.len() != size {
            return Err(RpcError::marshal(format!(
                "binary size mismatch: marker says {size}, buffer has {}",
                bytes.len()
            )));
        }
        Ok(RpcValue::Binary(BinaryValue {
            kind: kind.to_string(),
            bytes: bytes.clone(),
        }))
    }

    fn decode_tagged(&self, name: &str, map: &Map<String, Json>) -> Result<RpcValue> {
        let scope_prefix = format!("{}_", self.scope);
        let local = name.strip_prefix(&scope_prefix).unwrap_or(name);

        if local == "Map" {
            return self.decode_map(map);
        }
        if local == "Set" {
            return self.decode_set(map);
        }

        // Error nodes carry their identity in dedicated directives and are
        // restored regardless of the type table.
        if map.contains_key(directive::ERROR) {
            return self.decode_error(map);
        }

        let unregistered = map
            .get(directive::UNREGISTERED)
            .and_then(Json::as_bool)
            .unwrap_or(false);
        if self.strict && unregistered {
            return Err(RpcError::marshal(format!(
                "unregistered type {name} rejected in strict mode"
            )));
        }

        let registered = self.types.class(name);

        if let Some(payload_node) = map.get(directive::JSON) {
            let payload = self.walk(payload_node)?;
            if let Some(factory) = registered.and_then(|t| t.custom_factory()) {
                return factory(&payload);
            }
            return Ok(RpcValue::Instance(InstanceValue {
                type_name: local.to_string(),
                properties: BTreeMap::new(),
                custom: Some(Box::new(payload)),
            }));
        }

        let properties = self.decode_props(map)?;
        if registered.is_some() {
            Ok(RpcValue::Instance(InstanceValue {
                type_name: local.to_string(),
                properties,
                custom: None,
            }))
        } else {
            // Unregistered in non-strict mode: plain-object fallback.
            Ok(RpcValue::Object(properties))
        }
    }

    fn decode_map(&self, map: &Map<String, Json>) -> Result<RpcValue> {
        let entries = map
            .get(directive::MAP_ENTRIES)
            .and_then(Json::as_array)
            .ok_or_else(|| RpcError::marshal("Map node without mapEntries"))?;
        let mut decoded = Vec::with_capacity(entries.len());
        for entry in entries {
            let pair = entry
                .as_array()
                .filter(|p| p.len() == 2)
                .ok_or_else(|| RpcError::marshal("malformed map entry"))?;
            decoded.push((self.walk(&pair[0])?, self.walk(&pair[1])?));
        }
        Ok(RpcValue::Map(decoded))
    }

    fn decode_set(&self, map: &Map<String, Json>) -> Result<RpcValue> {
        let entries = map
            .get(directive::SET_ENTRIES)
            .and_then(Json::as_array)
            .ok_or_else(|| RpcError::marshal("Set node without setEntries"))?;
        let decoded: Result<Vec<RpcValue>> = entries.iter().map(|v| self.walk(v)).collect();
        Ok(RpcValue::Set(decoded?))
    }

    fn decode_error(&self, map: &Map<String, Json>) -> Result<RpcValue> {
        let name = map
            .get(directive::ERROR_NAME)
            .and_then(Json::as_str)
            .unwrap_or("Error")
            .to_string();
        let message = map
            .get(directive::ERROR_MESSAGE)
            .and_then(Json::as_str)
            .unwrap_or_default()
            .to_string();
        let stack = map
            .get(directive::ERROR_STACK)
            .and_then(Json::as_str)
            .map(str::to_string);
        Ok(RpcValue::Error(ErrorValue {
            name,
            message,
            stack,
            properties: self.decode_props(map)?,
        }))
    }

    /// Decode non-directive properties and re-insert undefined-keys entries
    /// as explicit `Undefined` values.
    fn decode_props(&self, map: &Map<String, Json>) -> Result<BTreeMap<String, RpcValue>> {
        let mut out = BTreeMap::new();
        for (key, value) in map {
            if DIRECTIVE_KEYS.contains(&key.as_str()) {
                continue;
            }
            out.insert(key.clone(), self.walk(value)?);
        }
        if let Some(undefined_keys) = map.get(directive::UNDEFINED).and_then(Json::as_array) {
            for key in undefined_keys {
                let key = key
                    .as_str()
                    .ok_or_else(|| RpcError::marshal("non-string undefined-keys entry"))?;
                out.insert(key.to_string(), RpcValue::Undefined);
            }
        }
        Ok(out)
    }
}

fn require_index(map: &Map<String, Json>, key: &str) -> Result<usize> {
    map.get(key)
        .and_then(Json::as_u64)
        .map(|v| v as usize)
        .ok_or_else(|| RpcError::marshal(format!("binary marker missing field: {key}")))
}

#[cfg(test)]
mod tests {
    use super::super::{
        MarshalType, MarshalTypeRegistry, RpcMarshaler, SerializedEnvelope, DEFAULT_BINARY_KIND,
    };
    use super::*;
    use serde_json::json;

    fn envelope(objects: Json, data: Vec<Bytes>) -> SerializedEnvelope {
        SerializedEnvelope {
            objects: objects.to_string(),
            data,
        }
    }

    #[test]
    fn test_empty_envelope_is_undefined() {
        let registry = MarshalTypeRegistry::new();
        let marshaler = RpcMarshaler::new("Foo", &registry);
        let value = marshaler.deserialize(&SerializedEnvelope::empty()).unwrap();
        assert!(value.is_undefined());
    }

    #[test]
    fn test_binary_index_out_of_range_is_fatal() {
        let registry = MarshalTypeRegistry::new();
        let marshaler = RpcMarshaler::new("Foo", &registry);
        let env = envelope(
            json!({directive::BINARY: true, "type": 0, "index": 3, "size": 1}),
            vec![Bytes::from_static(&[1])],
        );
        let err = marshaler.deserialize(&env).unwrap_err();
        assert!(err.is_marshaling());
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_unknown_binary_type_index_is_fatal() {
        let registry = MarshalTypeRegistry::new();
        let marshaler = RpcMarshaler::new("Foo", &registry);
        let env = envelope(
            json!({directive::BINARY: true, "type": 9, "index": 0, "size": 1}),
            vec![Bytes::from_static(&[1])],
        );
        let err = marshaler.deserialize(&env).unwrap_err();
        assert!(err.is_marshaling());
        assert!(err.to_string().contains("unknown binary type"));
    }

    #[test]
    fn test_binary_size_mismatch_is_fatal() {
        let registry = MarshalTypeRegistry::new();
        let marshaler = RpcMarshaler::new("Foo", &registry);
        let env = envelope(
            json!({directive::BINARY: true, "type": 0, "index": 0, "size": 5}),
            vec![Bytes::from_static(&[1, 2])],
        );
        assert!(marshaler.deserialize(&env).unwrap_err().is_marshaling());
    }

    #[test]
    fn test_strict_mode_rejects_unregistered_tag() {
        let registry = MarshalTypeRegistry::new();
        let value = crate::value::RpcValue::instance("Mystery", [("x", RpcValue::from(1))]);

        let lax = RpcMarshaler::new("Foo", &registry);
        let env = lax.serialize(&value).unwrap();

        // Non-strict: plain-object fallback.
        let fallback = lax.deserialize(&env).unwrap();
        assert_eq!(fallback, RpcValue::object([("x", RpcValue::from(1))]));

        // Strict: hard failure.
        let strict = RpcMarshaler::new("Foo", &registry).with_strict(true);
        let err = strict.deserialize(&env).unwrap_err();
        assert!(err.is_marshaling());
        assert!(err.to_string().contains("strict mode"));
    }

    #[test]
    fn test_strict_mode_accepts_registered_tag() {
        let mut registry = MarshalTypeRegistry::new();
        registry.register_class("Foo", MarshalType::new("Point"));
        let marshaler = RpcMarshaler::new("Foo", &registry).with_strict(true);
        let value = RpcValue::instance("Point", [("x", RpcValue::from(1))]);
        let env = marshaler.serialize(&value).unwrap();
        assert_eq!(marshaler.deserialize(&env).unwrap(), value);
    }

    #[test]
    fn test_error_node_restored_despite_unregistered_tag() {
        let registry = MarshalTypeRegistry::new();
        let marshaler = RpcMarshaler::new("Foo", &registry).with_strict(true);
        let value = RpcValue::error("TypeError", "bad argument");
        let env = marshaler.serialize(&value).unwrap();
        assert_eq!(marshaler.deserialize(&env).unwrap(), value);
    }

    #[test]
    fn test_foreign_scope_tag_falls_back() {
        // A tag qualified under another scope still parses; it is simply
        // not found in the type table and falls back accordingly.
        let registry = MarshalTypeRegistry::new();
        let env = envelope(
            json!({directive::NAME: "Bar_Widget", directive::UNREGISTERED: true, "w": 3}),
            vec![],
        );
        let marshaler = RpcMarshaler::new("Foo", &registry);
        let value = marshaler.deserialize(&env).unwrap();
        assert_eq!(value, RpcValue::object([("w", RpcValue::from(3))]));
    }

    #[test]
    fn test_malformed_objects_text_is_marshal_error() {
        let registry = MarshalTypeRegistry::new();
        let marshaler = RpcMarshaler::new("Foo", &registry);
        let env = SerializedEnvelope {
            objects: "{not json".into(),
            data: vec![],
        };
        assert!(marshaler.deserialize(&env).unwrap_err().is_marshaling());
    }
}
