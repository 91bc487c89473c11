//! Configuration: binds a set of interfaces to one protocol and supplies
//! default policy for the requests and invocations flowing through it.

use crate::error::Result;
use crate::interface::InterfaceDefinition;
use crate::operation::{OperationDescriptor, OperationPolicy};
use crate::protocol::Protocol;
use crate::registry::RpcRegistry;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;

/// Client-side recovery hook, awaited once before the single NotFound
/// resubmission. Receives the interface name.
pub type NotFoundRecovery = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;

/// Backend-side recovery hook: given the registry and an interface name it
/// failed to resolve, may register the interface late. Returns whether the
/// lookup is worth retrying.
pub type ActivationHook = Arc<dyn Fn(&RpcRegistry, &str) -> bool + Send + Sync>;

const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Binds one protocol, the interfaces it manages and policy defaults.
/// Never mutated after `activate()`; concurrently outstanding requests
/// share nothing else.
pub struct RpcConfiguration {
    registry: Arc<RpcRegistry>,
    protocol: Arc<dyn Protocol>,
    interfaces: Vec<String>,
    default_retry_interval: Duration,
    development_mode: bool,
    strict_marshaling: bool,
    not_found_recovery: Option<NotFoundRecovery>,
    activation_hook: Option<ActivationHook>,
}

impl RpcConfiguration {
    pub fn new(registry: Arc<RpcRegistry>, protocol: Arc<dyn Protocol>) -> Self {
        Self {
            registry,
            protocol,
            interfaces: Vec::new(),
            default_retry_interval: DEFAULT_RETRY_INTERVAL,
            development_mode: false,
            strict_marshaling: false,
            not_found_recovery: None,
            activation_hook: None,
        }
    }

    /// Register an interface with default policy and place it under this
    /// configuration's management.
    pub fn manage(self, definition: InterfaceDefinition) -> Result<Self> {
        self.manage_with_policy(definition, OperationPolicy::default())
    }

    /// Register an interface with policy overrides.
    pub fn manage_with_policy(
        mut self,
        definition: InterfaceDefinition,
        policy: OperationPolicy,
    ) -> Result<Self> {
        let name = definition.name().to_string();
        self.registry
            .register_interface_with_policy(definition, policy)?;
        if !self.interfaces.contains(&name) {
            self.interfaces.push(name);
        }
        Ok(self)
    }

    /// Retry interval used when an operation's policy does not supply one.
    pub fn with_default_retry_interval(mut self, interval: Duration) -> Self {
        self.default_retry_interval = interval;
        self
    }

    /// In development mode, backend error stacks survive transmission;
    /// otherwise they are scrubbed.
    pub fn with_development_mode(mut self, enabled: bool) -> Self {
        self.development_mode = enabled;
        self
    }

    /// Strict marshaling turns unregistered-type deserialization into a
    /// hard failure.
    pub fn with_strict_marshaling(mut self, enabled: bool) -> Self {
        self.strict_marshaling = enabled;
        self
    }

    pub fn with_not_found_recovery(mut self, hook: NotFoundRecovery) -> Self {
        self.not_found_recovery = Some(hook);
        self
    }

    pub fn with_activation_hook(mut self, hook: ActivationHook) -> Self {
        self.activation_hook = Some(hook);
        self
    }

    /// Finalize the configuration and hand the protocol its back-reference.
    pub fn activate(self) -> Arc<Self> {
        let configuration = Arc::new(self);
        configuration.protocol.attach(&configuration);
        configuration
    }

    pub fn registry(&self) -> &Arc<RpcRegistry> {
        &self.registry
    }

    pub fn protocol(&self) -> &Arc<dyn Protocol> {
        &self.protocol
    }

    /// Names of the interfaces this configuration manages.
    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    pub fn default_retry_interval(&self) -> Duration {
        self.default_retry_interval
    }

    pub fn development_mode(&self) -> bool {
        self.development_mode
    }

    pub fn strict_marshaling(&self) -> bool {
        self.strict_marshaling
    }

    pub fn not_found_recovery(&self) -> Option<&NotFoundRecovery> {
        self.not_found_recovery.as_ref()
    }

    pub fn activation_hook(&self) -> Option<&ActivationHook> {
        self.activation_hook.as_ref()
    }

    /// Every operation descriptor under this configuration's management.
    pub fn managed_operations(&self) -> Vec<Arc<OperationDescriptor>> {
        self.interfaces
            .iter()
            .filter_map(|name| self.registry.descriptors(name).ok())
            .flatten()
            .collect()
    }
}

impl std::fmt::Debug for RpcConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcConfiguration")
            .field("interfaces", &self.interfaces)
            .field("default_retry_interval", &self.default_retry_interval)
            .field("development_mode", &self.development_mode)
            .field("strict_marshaling", &self.strict_marshaling)
            .finish_non_exhaustive()
    }
}
