//! Process-wide interface registry.
//!
//! Maps an interface's declared name to its definition, its operation
//! descriptors and the object implementing it (backend) or proxying it
//! (frontend). Write-once-per-interface, read on every call. Registries
//! are explicit instances with an `initialize`/`dispose` lifecycle so
//! tests can construct isolated ones; there is no ambient global.

use crate::error::{Result, RpcError};
use crate::interface::InterfaceDefinition;
use crate::invocation::RpcImpl;
use crate::marshal::MarshalTypeRegistry;
use crate::operation::{OperationDescriptor, OperationPolicy};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

struct RegisteredInterface {
    definition: InterfaceDefinition,
    operations: HashMap<String, Arc<OperationDescriptor>>,
    implementation: Option<Arc<dyn RpcImpl>>,
}

struct Inner {
    initialized: bool,
    interfaces: HashMap<String, RegisteredInterface>,
    types: MarshalTypeRegistry,
}

/// The interface registry. Owns operation descriptors and the marshal type
/// tables for the process lifetime.
pub struct RpcRegistry {
    inner: RwLock<Inner>,
}

impl Default for RpcRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RpcRegistry {
    /// Create an uninitialized registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                initialized: false,
                interfaces: HashMap::new(),
                types: MarshalTypeRegistry::new(),
            }),
        }
    }

    /// Open the registry for registration. Idempotent.
    pub fn initialize(&self) {
        let mut inner = self.write();
        inner.initialized = true;
    }

    /// Drop all registrations and return to the uninitialized state.
    pub fn dispose(&self) {
        let mut inner = self.write();
        inner.initialized = false;
        inner.interfaces.clear();
        inner.types = MarshalTypeRegistry::new();
    }

    pub fn is_initialized(&self) -> bool {
        self.read().initialized
    }

    /// Register an interface with default policy.
    pub fn register_interface(&self, definition: InterfaceDefinition) -> Result<()> {
        self.register_interface_with_policy(definition, OperationPolicy::default())
    }

    /// Register an interface with policy overrides. Idempotent per name;
    /// re-registering a different contract under the same name fails, which
    /// protects against version drift within one process.
    pub fn register_interface_with_policy(
        &self,
        definition: InterfaceDefinition,
        policy: OperationPolicy,
    ) -> Result<()> {
        let mut inner = self.write();
        if !inner.initialized {
            return Err(RpcError::configuration(format!(
                "registry not initialized; cannot register {}",
                definition.name()
            )));
        }

        if let Some(existing) = inner.interfaces.get(definition.name()) {
            if existing.definition.same_contract(&definition) {
                return Ok(());
            }
            return Err(RpcError::configuration(format!(
                "interface {} already registered as version {}; refusing version {}",
                definition.name(),
                existing.definition.version(),
                definition.version()
            )));
        }

        let operations = OperationDescriptor::build_map(&definition, &policy)?;
        for ty in definition.types() {
            inner.types.register_class(definition.name(), ty.clone());
        }
        debug!(
            interface = definition.name(),
            version = %definition.version(),
            operations = operations.len(),
            "registered interface"
        );
        inner.interfaces.insert(
            definition.name().to_string(),
            RegisteredInterface {
                definition,
                operations,
                implementation: None,
            },
        );
        Ok(())
    }

    /// Attach the concrete implementation of a registered interface.
    pub fn register_impl(&self, name: &str, implementation: Arc<dyn RpcImpl>) -> Result<()> {
        let mut inner = self.write();
        let registered = inner
            .interfaces
            .get_mut(name)
            .ok_or_else(|| RpcError::NotConfigured { name: name.into() })?;
        registered.implementation = Some(implementation);
        Ok(())
    }

    /// Look up a registered interface definition.
    pub fn lookup(&self, name: &str) -> Result<InterfaceDefinition> {
        self.read()
            .interfaces
            .get(name)
            .map(|r| r.definition.clone())
            .ok_or_else(|| RpcError::NotConfigured { name: name.into() })
    }

    /// Resolve the implementation handle of a registered interface.
    pub fn resolve_impl(&self, name: &str) -> Result<Arc<dyn RpcImpl>> {
        self.read()
            .interfaces
            .get(name)
            .and_then(|r| r.implementation.clone())
            .ok_or_else(|| RpcError::NotConfigured { name: name.into() })
    }

    /// Resolve an operation descriptor by (interface, operation) name.
    pub fn lookup_operation(
        &self,
        interface: &str,
        operation: &str,
    ) -> Result<Arc<OperationDescriptor>> {
        let inner = self.read();
        let registered = inner
            .interfaces
            .get(interface)
            .ok_or_else(|| RpcError::NotConfigured {
                name: interface.into(),
            })?;
        registered
            .operations
            .get(operation)
            .cloned()
            .ok_or_else(|| RpcError::OperationNotFound {
                interface: interface.into(),
                operation: operation.into(),
            })
    }

    /// All descriptors of a registered interface.
    pub fn descriptors(&self, interface: &str) -> Result<Vec<Arc<OperationDescriptor>>> {
        let inner = self.read();
        let registered = inner
            .interfaces
            .get(interface)
            .ok_or_else(|| RpcError::NotConfigured {
                name: interface.into(),
            })?;
        Ok(registered.operations.values().cloned().collect())
    }

    /// Run a closure against the marshal type tables.
    pub fn with_types<R>(&self, f: impl FnOnce(&MarshalTypeRegistry) -> R) -> R {
        f(&self.read().types)
    }

    /// Register an additional binary kind, returning its wire index.
    pub fn register_binary_kind(&self, kind: impl Into<String>) -> usize {
        self.write().types.register_binary_kind(kind)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for RpcRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.read();
        f.debug_struct("RpcRegistry")
            .field("initialized", &inner.initialized)
            .field("interfaces", &inner.interfaces.keys().collect::<Vec<_>>())
            .finish()
    }
}
