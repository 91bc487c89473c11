//! Operation descriptors and policy.
//!
//! One descriptor exists per (interface, method) pair, built at
//! registration time and immutable thereafter. Policy fields are plain
//! supplier functions; unset fields take the documented defaults, so no
//! field is ever absent at rest.

use crate::configuration::RpcConfiguration;
use crate::error::{Result, RpcError};
use crate::interface::InterfaceDefinition;
use crate::protocol::RequestStatus;
use crate::value::RpcValue;
use semver::Version;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Well-known type name the default token supplier scans parameters for.
pub const ACCESS_TOKEN_TYPE: &str = "AccessToken";

/// Bookkeeping entries never exposed as callable operations.
const RESERVED_OPERATIONS: &[&str] = &["new", "constructor"];

/// Extracts an access token from the outgoing parameters.
pub type TokenSupplier = Arc<dyn Fn(&[RpcValue]) -> Option<String> + Send + Sync>;
/// Produces a fresh request id.
pub type RequestIdSupplier = Arc<dyn Fn() -> String + Send + Sync>;
/// Produces the retry interval for a pending resubmission.
pub type RetryIntervalSupplier = Arc<dyn Fn(&RpcConfiguration) -> Duration + Send + Sync>;
/// Observes client-side request status transitions.
pub type RequestCallback = Arc<dyn Fn(&RequestSnapshot) + Send + Sync>;
/// Observes completed backend invocations.
pub type InvocationCallback = Arc<dyn Fn(&InvocationSnapshot) + Send + Sync>;

/// Point-in-time view of a client request, handed to `request_callback`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSnapshot {
    pub id: String,
    pub status: RequestStatus,
    pub retry_count: u32,
}

/// Summary of a finished invocation, handed to `invocation_callback`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationSnapshot {
    pub interface: String,
    pub operation: String,
    pub status: RequestStatus,
    pub elapsed: Duration,
}

/// Per-operation policy. A configuration struct, not a class hierarchy;
/// interfaces override individual fields at registration.
#[derive(Clone)]
pub struct OperationPolicy {
    pub token: TokenSupplier,
    pub request_id: RequestIdSupplier,
    pub retry_interval: RetryIntervalSupplier,
    pub requires_acknowledgement: bool,
    pub request_callback: RequestCallback,
    pub invocation_callback: InvocationCallback,
}

impl Default for OperationPolicy {
    fn default() -> Self {
        Self {
            token: Arc::new(default_token_supplier),
            request_id: Arc::new(|| uuid::Uuid::new_v4().to_string()),
            retry_interval: Arc::new(|configuration: &RpcConfiguration| {
                configuration.default_retry_interval()
            }),
            requires_acknowledgement: false,
            request_callback: Arc::new(|_| {}),
            invocation_callback: Arc::new(|_| {}),
        }
    }
}

impl OperationPolicy {
    pub fn with_retry_interval(mut self, supplier: RetryIntervalSupplier) -> Self {
        self.retry_interval = supplier;
        self
    }

    pub fn with_request_id(mut self, supplier: RequestIdSupplier) -> Self {
        self.request_id = supplier;
        self
    }

    pub fn with_token(mut self, supplier: TokenSupplier) -> Self {
        self.token = supplier;
        self
    }

    pub fn with_request_callback(mut self, callback: RequestCallback) -> Self {
        self.request_callback = callback;
        self
    }

    pub fn with_invocation_callback(mut self, callback: InvocationCallback) -> Self {
        self.invocation_callback = callback;
        self
    }

    pub fn with_acknowledgement(mut self, required: bool) -> Self {
        self.requires_acknowledgement = required;
        self
    }
}

impl std::fmt::Debug for OperationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationPolicy")
            .field("requires_acknowledgement", &self.requires_acknowledgement)
            .finish_non_exhaustive()
    }
}

/// Scan the parameter list for a well-known `AccessToken` instance and lift
/// its `token` property.
fn default_token_supplier(parameters: &[RpcValue]) -> Option<String> {
    parameters.iter().find_map(|parameter| match parameter {
        RpcValue::Instance(instance) if instance.type_name == ACCESS_TOKEN_TYPE => instance
            .properties
            .get("token")
            .and_then(RpcValue::as_str)
            .map(str::to_string),
        _ => None,
    })
}

/// Per-method metadata: interface identity, operation name and policy.
/// Looked up by name on every call.
#[derive(Debug, Clone)]
pub struct OperationDescriptor {
    interface_name: String,
    interface_version: Version,
    operation_name: String,
    policy: OperationPolicy,
}

impl OperationDescriptor {
    pub fn interface_name(&self) -> &str {
        &self.interface_name
    }

    pub fn interface_version(&self) -> &Version {
        &self.interface_version
    }

    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }

    pub fn policy(&self) -> &OperationPolicy {
        &self.policy
    }

    /// Enumerate the declared operations of an interface, excluding
    /// constructor-like bookkeeping entries.
    pub fn for_each(definition: &InterfaceDefinition, mut callback: impl FnMut(&str)) {
        for operation in definition.operations() {
            if RESERVED_OPERATIONS.contains(&operation.as_str()) {
                continue;
            }
            callback(operation);
        }
    }

    /// Build the immutable operation-name → descriptor map for an
    /// interface. Fails if the interface declares no callable operations.
    pub fn build_map(
        definition: &InterfaceDefinition,
        policy: &OperationPolicy,
    ) -> Result<HashMap<String, Arc<OperationDescriptor>>> {
        let mut map = HashMap::new();
        Self::for_each(definition, |operation| {
            map.insert(
                operation.to_string(),
                Arc::new(OperationDescriptor {
                    interface_name: definition.name().to_string(),
                    interface_version: definition.version().clone(),
                    operation_name: operation.to_string(),
                    policy: policy.clone(),
                }),
            );
        });
        if map.is_empty() {
            return Err(RpcError::Configuration {
                message: format!(
                    "interface {} declares no callable operations",
                    definition.name()
                ),
            });
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition() -> InterfaceDefinition {
        InterfaceDefinition::new("Echo", "1.0.0")
            .unwrap()
            .with_operations(["ping", "new", "shout"])
    }

    #[test]
    fn test_for_each_excludes_reserved_entries() {
        let mut seen = Vec::new();
        OperationDescriptor::for_each(&definition(), |op| seen.push(op.to_string()));
        assert_eq!(seen, vec!["ping", "shout"]);
    }

    #[test]
    fn test_build_map_one_descriptor_per_operation() {
        let map = OperationDescriptor::build_map(&definition(), &OperationPolicy::default())
            .expect("build_map failed");
        assert_eq!(map.len(), 2);
        let ping = &map["ping"];
        assert_eq!(ping.interface_name(), "Echo");
        assert_eq!(ping.operation_name(), "ping");
        assert_eq!(ping.interface_version().to_string(), "1.0.0");
    }

    #[test]
    fn test_build_map_rejects_empty_interface() {
        let empty = InterfaceDefinition::new("Empty", "1.0.0").unwrap();
        let err =
            OperationDescriptor::build_map(&empty, &OperationPolicy::default()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_default_request_ids_are_unique() {
        let policy = OperationPolicy::default();
        let a = (policy.request_id)();
        let b = (policy.request_id)();
        assert_ne!(a, b);
    }

    #[test]
    fn test_default_token_supplier_scans_parameters() {
        let policy = OperationPolicy::default();
        let parameters = vec![
            RpcValue::from(1),
            RpcValue::instance(ACCESS_TOKEN_TYPE, [("token", RpcValue::from("abc"))]),
        ];
        assert_eq!((policy.token)(&parameters), Some("abc".to_string()));
        assert_eq!((policy.token)(&[RpcValue::from(1)]), None);
    }
}
