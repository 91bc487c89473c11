//! Envelope serializer: depth-first walk of a value graph.

use super::directive;
use super::types::{qualify, MarshalTypeRegistry};
use super::SerializedEnvelope;
use crate::error::{Result, RpcError};
use crate::value::{BinaryValue, ErrorValue, InstanceValue, RpcValue};
use bytes::Bytes;
use serde_json::{json, Map, Value as Json};
use std::collections::BTreeMap;

/// One serialize pass. Opens a fresh `data` array; binary leaves land in it
/// in first-encountered order.
pub(super) struct Serializer<'a> {
    scope: &'a str,
    types: &'a MarshalTypeRegistry,
    data: Vec<Bytes>,
}

impl<'a> Serializer<'a> {
    pub(super) fn new(scope: &'a str, types: &'a MarshalTypeRegistry) -> Self {
        Self {
            scope,
            types,
            data: Vec::new(),
        }
    }

    pub(super) fn run(mut self, value: &RpcValue) -> Result<SerializedEnvelope> {
        if value.is_undefined() {
            return Ok(SerializedEnvelope::empty());
        }
        let tree = self.walk(value)?;
        Ok(SerializedEnvelope {
            objects: serde_json::to_string(&tree)?,
            data: self.data,
        })
    }

    fn walk(&mut self, value: &RpcValue) -> Result<Json> {
        match value {
            // A bare undefined inside an array or entry list degrades to
            // null; only object properties get the undefined-keys treatment.
            RpcValue::Undefined | RpcValue::Null => Ok(Json::Null),
            RpcValue::Bool(b) => Ok(Json::Bool(*b)),
            RpcValue::Number(n) => encode_number(*n),
            RpcValue::String(s) => Ok(Json::String(s.clone())),
            RpcValue::Array(items) => {
                let encoded: Result<Vec<Json>> = items.iter().map(|v| self.walk(v)).collect();
                Ok(Json::Array(encoded?))
            }
            RpcValue::Object(props) => Ok(Json::Object(self.encode_props(props)?)),
            RpcValue::Map(entries) => self.encode_map(entries),
            RpcValue::Set(entries) => self.encode_set(entries),
            RpcValue::Binary(binary) => self.encode_binary(binary),
            RpcValue::Instance(instance) => self.encode_instance(instance),
            RpcValue::Error(error) => self.encode_error(error),
        }
    }

    /// Encode enumerable properties, recording undefined-valued keys in the
    /// side list so they survive the text encoding.
    fn encode_props(&mut self, props: &BTreeMap<String, RpcValue>) -> Result<Map<String, Json>> {
        let mut out = Map::new();
        let mut undefined_keys = Vec::new();
        for (key, value) in props {
            if value.is_undefined() {
                undefined_keys.push(Json::String(key.clone()));
            } else {
                out.insert(key.clone(), self.walk(value)?);
            }
        }
        if !undefined_keys.is_empty() {
            out.insert(directive::UNDEFINED.into(), Json::Array(undefined_keys));
        }
        Ok(out)
    }

    fn encode_map(&mut self, entries: &[(RpcValue, RpcValue)]) -> Result<Json> {
        let mut encoded = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            encoded.push(Json::Array(vec![self.walk(key)?, self.walk(value)?]));
        }
        Ok(json!({
            directive::NAME: qualify(self.scope, "Map"),
            directive::MAP_ENTRIES: encoded,
        }))
    }

    fn encode_set(&mut self, entries: &[RpcValue]) -> Result<Json> {
        let encoded: Result<Vec<Json>> = entries.iter().map(|v| self.walk(v)).collect();
        Ok(json!({
            directive::NAME: qualify(self.scope, "Set"),
            directive::SET_ENTRIES: encoded?,
        }))
    }

    fn encode_binary(&mut self, binary: &BinaryValue) -> Result<Json> {
        let type_index = self.types.binary_index(&binary.kind).ok_or_else(|| {
            RpcError::marshal(format!("unregistered binary kind: {}", binary.kind))
        })?;
        let data_index = self.data.len();
        self.data.push(binary.bytes.clone());
        Ok(json!({
            directive::BINARY: true,
            "type": type_index,
            "index": data_index,
            "size": binary.bytes.len(),
        }))
    }

    fn encode_instance(&mut self, instance: &InstanceValue) -> Result<Json> {
        let qualified = qualify(self.scope, &instance.type_name);
        let unregistered = !self.types.is_registered(&qualified);

        if let Some(custom) = &instance.custom {
            return Ok(json!({
                directive::NAME: qualified,
                directive::JSON: self.walk(custom)?,
                directive::UNREGISTERED: unregistered,
            }));
        }

        let mut out = self.encode_props(&instance.properties)?;
        out.insert(directive::NAME.into(), Json::String(qualified));
        out.insert(directive::UNREGISTERED.into(), Json::Bool(unregistered));
        Ok(Json::Object(out))
    }

    /// Errors are instance nodes whose identity fields are snapshotted into
    /// dedicated directives; a plain property walk would miss them.
    fn encode_error(&mut self, error: &ErrorValue) -> Result<Json> {
        let qualified = qualify(self.scope, &error.name);
        let unregistered = !self.types.is_registered(&qualified);

        let mut out = self.encode_props(&error.properties)?;
        out.insert(directive::NAME.into(), Json::String(qualified));
        out.insert(directive::UNREGISTERED.into(), Json::Bool(unregistered));
        out.insert(directive::ERROR.into(), Json::Bool(true));
        out.insert(
            directive::ERROR_NAME.into(),
            Json::String(error.name.clone()),
        );
        out.insert(
            directive::ERROR_MESSAGE.into(),
            Json::String(error.message.clone()),
        );
        if let Some(stack) = &error.stack {
            out.insert(directive::ERROR_STACK.into(), Json::String(stack.clone()));
        }
        Ok(Json::Object(out))
    }
}

fn encode_number(n: f64) -> Result<Json> {
    if !n.is_finite() {
        return Err(RpcError::marshal(format!("non-finite number: {n}")));
    }
    // Integral values encode as integers to keep the wire form readable.
    if n.fract() == 0.0 && n.abs() < (i64::MAX as f64) {
        return Ok(Json::from(n as i64));
    }
    serde_json::Number::from_f64(n)
        .map(Json::Number)
        .ok_or_else(|| RpcError::marshal(format!("unencodable number: {n}")))
}
