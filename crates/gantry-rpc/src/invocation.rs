//! Backend invocation dispatcher.
//!
//! One `Invocation` exists per incoming request: it resolves the operation
//! descriptor, gates on version compatibility, runs the implementation
//! inside a per-call context and folds the outcome into a fulfillment.
//! Dispatch is concurrent and stateless between calls; the registry is the
//! only shared state.

use crate::configuration::RpcConfiguration;
use crate::error::{Result, RpcError};
use crate::marshal::{RpcMarshaler, SerializedEnvelope};
use crate::operation::{InvocationSnapshot, OperationDescriptor};
use crate::protocol::{Fulfillment, RequestStatus, SerializedRequest};
use crate::value::{ErrorValue, RpcValue};
use async_trait::async_trait;
use semver::Version;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn, Instrument};

/// A backend implementation of one interface. Registered against the
/// interface's name; invoked with the operation name and deserialized
/// parameters.
#[async_trait]
pub trait RpcImpl: Send + Sync {
    async fn invoke(
        &self,
        operation: &str,
        parameters: Vec<RpcValue>,
        context: &InvocationContext,
    ) -> Result<RpcValue>;
}

/// Per-invocation ambient state. Scoped to one call, never shared.
#[derive(Debug)]
pub struct InvocationContext {
    activity_id: String,
    started_at: Instant,
}

impl InvocationContext {
    fn new() -> Self {
        Self {
            activity_id: uuid::Uuid::new_v4().to_string(),
            started_at: Instant::now(),
        }
    }

    /// Correlation id for this call.
    pub fn activity_id(&self) -> &str {
        &self.activity_id
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Caller/callee version gate: both must share the same major component and
/// the callee's minor.patch must not lag the caller's.
pub fn is_version_compatible(caller: &Version, callee: &Version) -> bool {
    caller.major == callee.major
        && (callee.minor, callee.patch) >= (caller.minor, caller.patch)
}

/// One incoming call.
pub struct Invocation {
    configuration: Arc<RpcConfiguration>,
    request: SerializedRequest,
}

impl Invocation {
    pub fn new(configuration: Arc<RpcConfiguration>, request: SerializedRequest) -> Self {
        Self {
            configuration,
            request,
        }
    }

    /// Run the invocation to a fulfillment. `Err` is reserved for
    /// marshaling faults; every application outcome, including thrown
    /// backend exceptions, is folded into the fulfillment status.
    pub async fn run(self) -> Result<Fulfillment> {
        let context = InvocationContext::new();
        let span = tracing::debug_span!(
            "rpc_invocation",
            interface = %self.request.operation.interface_definition,
            operation = %self.request.operation.operation_name,
            activity = %context.activity_id,
        );
        self.run_in_context(context).instrument(span).await
    }

    async fn run_in_context(self, context: InvocationContext) -> Result<Fulfillment> {
        let interface_name = self.request.operation.interface_definition.clone();
        let request_id = self.request.id.clone();

        let (descriptor, outcome) = match self.resolve_descriptor() {
            Ok(descriptor) => {
                let result = self.execute(&descriptor, &context).await;
                (Some(descriptor), result)
            }
            Err(err) => (None, Err(err)),
        };

        let (status, result) = match outcome {
            Ok(value) => (RequestStatus::Resolved, self.serialize_result(&value)?),
            Err(err) if err.is_marshaling() => return Err(err),
            Err(RpcError::Pending { message }) => {
                debug!(message = %message, "invocation pending");
                (RequestStatus::Pending, pending_payload(&message)?)
            }
            Err(err) => {
                let status = err.status();
                if status == RequestStatus::NotFound {
                    warn!(error = %err, "operation not resolved");
                    (RequestStatus::NotFound, SerializedEnvelope::empty())
                } else {
                    warn!(error = %err, "invocation rejected");
                    (RequestStatus::Rejected, self.serialize_rejection(err)?)
                }
            }
        };

        let elapsed = context.elapsed();
        debug!(
            elapsed_ms = elapsed.as_millis() as u64,
            status = ?status,
            "invocation finished"
        );
        if let Some(descriptor) = &descriptor {
            (descriptor.policy().invocation_callback)(&InvocationSnapshot {
                interface: descriptor.interface_name().to_string(),
                operation: descriptor.operation_name().to_string(),
                status,
                elapsed,
            });
        }

        Ok(Fulfillment {
            result,
            status,
            id: request_id,
            interface_name,
        })
    }

    /// Resolve and version-gate the operation descriptor. A failed lookup
    /// or an incompatible version runs the activation hook once, then
    /// retries; an unresolved lookup becomes a NotFound outcome.
    fn resolve_descriptor(&self) -> Result<Arc<OperationDescriptor>> {
        match self.lookup_and_gate() {
            Ok(descriptor) => Ok(descriptor),
            Err(first) => {
                let recovered = self
                    .configuration
                    .activation_hook()
                    .map(|hook| {
                        hook(
                            self.configuration.registry(),
                            &self.request.operation.interface_definition,
                        )
                    })
                    .unwrap_or(false);
                if recovered {
                    self.lookup_and_gate()
                } else {
                    Err(first)
                }
            }
        }
    }

    fn lookup_and_gate(&self) -> Result<Arc<OperationDescriptor>> {
        let descriptor = self.configuration.registry().lookup_operation(
            &self.request.operation.interface_definition,
            &self.request.operation.operation_name,
        )?;
        self.gate_version(&descriptor)?;
        Ok(descriptor)
    }

    fn gate_version(&self, descriptor: &OperationDescriptor) -> Result<()> {
        let caller_version = &self.request.operation.interface_version;
        let caller = Version::parse(caller_version).map_err(|_| RpcError::InvalidVersion {
            value: caller_version.clone(),
        })?;
        let callee = descriptor.interface_version();
        if is_version_compatible(&caller, callee) {
            Ok(())
        } else {
            Err(RpcError::IncompatibleVersion {
                interface: descriptor.interface_name().to_string(),
                caller: caller.to_string(),
                callee: callee.to_string(),
            })
        }
    }

    async fn execute(
        &self,
        descriptor: &OperationDescriptor,
        context: &InvocationContext,
    ) -> Result<RpcValue> {
        let interface = descriptor.interface_name();
        let parameters = self.deserialize_parameters(interface)?;
        let implementation = self
            .configuration
            .registry()
            .resolve_impl(interface)
            .map_err(|err| RpcError::NotFound {
                message: err.to_string(),
            })?;
        implementation
            .invoke(descriptor.operation_name(), parameters, context)
            .await
    }

    fn deserialize_parameters(&self, interface: &str) -> Result<Vec<RpcValue>> {
        let strict = self.configuration.strict_marshaling();
        let value = self.configuration.registry().with_types(|types| {
            RpcMarshaler::new(interface, types)
                .with_strict(strict)
                .deserialize(&self.request.parameters)
        })?;
        Ok(match value {
            RpcValue::Undefined => Vec::new(),
            RpcValue::Array(items) => items,
            other => vec![other],
        })
    }

    fn serialize_result(&self, value: &RpcValue) -> Result<SerializedEnvelope> {
        let interface = &self.request.operation.interface_definition;
        self.configuration
            .registry()
            .with_types(|types| RpcMarshaler::new(interface, types).serialize(value))
    }

    /// Serialize a rejection. The stack survives only in development mode;
    /// production scrubs it before transmission.
    fn serialize_rejection(&self, err: RpcError) -> Result<SerializedEnvelope> {
        let (name, message, stack) = match err {
            RpcError::Backend {
                name,
                message,
                stack,
            } => (name, message, stack),
            other => ("RpcError".to_string(), other.to_string(), None),
        };
        let stack = if self.configuration.development_mode() {
            stack
        } else {
            None
        };
        let value = RpcValue::Error(ErrorValue {
            name,
            message,
            stack,
            properties: BTreeMap::new(),
        });
        self.serialize_result(&value)
    }
}

/// The pending signal's message travels as the retry payload.
fn pending_payload(message: &str) -> Result<SerializedEnvelope> {
    Ok(SerializedEnvelope {
        objects: serde_json::to_string(message)?,
        data: Vec::new(),
    })
}
