//! Interface definitions: the declared shape of one RPC interface.

use crate::error::{Result, RpcError};
use crate::marshal::MarshalType;
use semver::Version;

/// Immutable declaration of an interface: its name, semantic version, the
/// operations it exposes and the static table of types it marshals.
/// Created once at startup; never mutated.
#[derive(Debug, Clone)]
pub struct InterfaceDefinition {
    name: String,
    version: Version,
    operations: Vec<String>,
    types: Vec<MarshalType>,
}

impl InterfaceDefinition {
    /// Declare an interface. The version must be valid semver.
    pub fn new(name: impl Into<String>, version: &str) -> Result<Self> {
        let name = name.into();
        let version = Version::parse(version).map_err(|e| RpcError::Configuration {
            message: format!("invalid version {version:?} for interface {name}: {e}"),
        })?;
        Ok(Self {
            name,
            version,
            operations: Vec::new(),
            types: Vec::new(),
        })
    }

    /// Declare an operation.
    pub fn with_operation(mut self, name: impl Into<String>) -> Self {
        self.operations.push(name.into());
        self
    }

    /// Declare several operations at once.
    pub fn with_operations<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.operations.extend(names.into_iter().map(Into::into));
        self
    }

    /// Declare a marshalable type. The interface name becomes the type's
    /// scope when the codec computes wire tags.
    pub fn with_type(mut self, ty: MarshalType) -> Self {
        self.types.push(ty);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn version_string(&self) -> String {
        self.version.to_string()
    }

    pub fn operations(&self) -> &[String] {
        &self.operations
    }

    pub fn types(&self) -> &[MarshalType] {
        &self.types
    }

    /// Whether another definition declares the same contract. Used to keep
    /// registration idempotent while rejecting version drift.
    pub fn same_contract(&self, other: &InterfaceDefinition) -> bool {
        self.name == other.name
            && self.version == other.version
            && self.operations == other.operations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_version_is_configuration_error() {
        let err = InterfaceDefinition::new("Echo", "not-a-version").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_same_contract() {
        let a = InterfaceDefinition::new("Echo", "1.2.3")
            .unwrap()
            .with_operation("ping");
        let b = InterfaceDefinition::new("Echo", "1.2.3")
            .unwrap()
            .with_operation("ping");
        let c = InterfaceDefinition::new("Echo", "1.2.4")
            .unwrap()
            .with_operation("ping");
        assert!(a.same_contract(&b));
        assert!(!a.same_contract(&c));
    }
}
