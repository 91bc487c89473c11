//! Static type tables consulted by the codec.
//!
//! Wire type tags are declared explicitly per interface instead of being
//! reflected from constructor identifiers, so minified or renamed peers
//! still agree on tag names.

use crate::error::Result;
use crate::value::RpcValue;
use std::collections::HashMap;
use std::sync::Arc;

/// The binary kind every registry knows about.
pub const DEFAULT_BINARY_KIND: &str = "Bytes";

/// Factory invoked when a registered type's node carries a custom
/// plain-value projection instead of enumerable properties.
pub type CustomFactory = Arc<dyn Fn(&RpcValue) -> Result<RpcValue> + Send + Sync>;

/// A marshalable class type declared by an interface.
#[derive(Clone)]
pub struct MarshalType {
    name: String,
    from_custom: Option<CustomFactory>,
}

impl MarshalType {
    /// Declare a type by its unqualified name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            from_custom: None,
        }
    }

    /// Attach a from-plain-value factory, consulted on deserialization when
    /// the node carries a custom payload.
    pub fn with_custom_factory(mut self, factory: CustomFactory) -> Self {
        self.from_custom = Some(factory);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn custom_factory(&self) -> Option<&CustomFactory> {
        self.from_custom.as_ref()
    }
}

impl std::fmt::Debug for MarshalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarshalType")
            .field("name", &self.name)
            .field("has_custom_factory", &self.from_custom.is_some())
            .finish()
    }
}

/// Compute the scope-qualified wire tag for a type name.
pub fn qualify(scope: &str, name: &str) -> String {
    format!("{scope}_{name}")
}

/// Process-wide table of class types (keyed by qualified tag) and binary
/// kinds (index = wire index). Owned by the interface registry; read-only
/// after registration.
#[derive(Debug, Clone)]
pub struct MarshalTypeRegistry {
    classes: HashMap<String, MarshalType>,
    binary_kinds: Vec<String>,
}

impl Default for MarshalTypeRegistry {
    fn default() -> Self {
        let mut registry = Self {
            classes: HashMap::new(),
            binary_kinds: Vec::new(),
        };
        registry.register_binary_kind(DEFAULT_BINARY_KIND);
        registry
    }
}

impl MarshalTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class type under the given scope. Last registration wins;
    /// interfaces are expected to declare disjoint type tables.
    pub fn register_class(&mut self, scope: &str, ty: MarshalType) {
        self.classes.insert(qualify(scope, ty.name()), ty);
    }

    /// Register a binary kind, returning its wire index. Idempotent.
    pub fn register_binary_kind(&mut self, kind: impl Into<String>) -> usize {
        let kind = kind.into();
        if let Some(index) = self.binary_kinds.iter().position(|k| *k == kind) {
            return index;
        }
        self.binary_kinds.push(kind);
        self.binary_kinds.len() - 1
    }

    /// Wire index of a binary kind, if registered.
    pub fn binary_index(&self, kind: &str) -> Option<usize> {
        self.binary_kinds.iter().position(|k| k == kind)
    }

    /// Binary kind at a wire index, if in range.
    pub fn binary_kind(&self, index: usize) -> Option<&str> {
        self.binary_kinds.get(index).map(String::as_str)
    }

    /// Look up a class type by its qualified tag.
    pub fn class(&self, qualified: &str) -> Option<&MarshalType> {
        self.classes.get(qualified)
    }

    /// Whether a qualified tag names a registered class type.
    pub fn is_registered(&self, qualified: &str) -> bool {
        self.classes.contains_key(qualified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_binary_kind_present() {
        let registry = MarshalTypeRegistry::new();
        assert_eq!(registry.binary_index(DEFAULT_BINARY_KIND), Some(0));
        assert_eq!(registry.binary_kind(0), Some(DEFAULT_BINARY_KIND));
        assert_eq!(registry.binary_kind(1), None);
    }

    #[test]
    fn test_binary_kind_registration_is_idempotent() {
        let mut registry = MarshalTypeRegistry::new();
        let a = registry.register_binary_kind("Float32Array");
        let b = registry.register_binary_kind("Float32Array");
        assert_eq!(a, b);
        assert_eq!(registry.binary_index("Float32Array"), Some(a));
    }

    #[test]
    fn test_class_lookup_is_scope_qualified() {
        let mut registry = MarshalTypeRegistry::new();
        registry.register_class("Foo", MarshalType::new("Point"));
        assert!(registry.is_registered("Foo_Point"));
        assert!(!registry.is_registered("Bar_Point"));
        assert_eq!(registry.class("Foo_Point").map(MarshalType::name), Some("Point"));
    }
}
