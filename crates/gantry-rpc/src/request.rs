//! Client request state machine.
//!
//! One `RpcRequest` per outgoing call: Created → Submitted → {Pending,
//! Resolved, Rejected, NotFound} → Disposed. Pending resubmits with the
//! same id after the policy's retry interval, indefinitely; NotFound runs
//! the recovery hook and resubmits exactly once. Disposal is cooperative:
//! the transport is not aborted, but its eventual result is discarded.

use crate::cancel::CancellationToken;
use crate::configuration::RpcConfiguration;
use crate::error::{Result, RpcError};
use crate::marshal::RpcMarshaler;
use crate::operation::{OperationDescriptor, RequestSnapshot};
use crate::protocol::{Fulfillment, RequestStatus, SerializedOperation, SerializedRequest};
use crate::value::RpcValue;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, warn};

/// Entry point for outgoing calls over one configuration.
#[derive(Debug, Clone)]
pub struct RpcClient {
    configuration: Arc<RpcConfiguration>,
}

impl RpcClient {
    pub fn new(configuration: Arc<RpcConfiguration>) -> Self {
        Self { configuration }
    }

    /// Begin a call. The returned request has not been submitted yet.
    pub fn request(
        &self,
        interface: &str,
        operation: &str,
        parameters: Vec<RpcValue>,
    ) -> Result<RpcRequest> {
        let descriptor = self
            .configuration
            .registry()
            .lookup_operation(interface, operation)?;
        Ok(RpcRequest::new(
            self.configuration.clone(),
            descriptor,
            parameters,
        ))
    }

    /// Begin a call and await its settlement.
    pub async fn call(
        &self,
        interface: &str,
        operation: &str,
        parameters: Vec<RpcValue>,
    ) -> Result<RpcValue> {
        self.request(interface, operation, parameters)?
            .response()
            .await
    }
}

/// One outgoing call. Owned exclusively by the caller; concurrently
/// outstanding requests share nothing beyond the configuration.
pub struct RpcRequest {
    configuration: Arc<RpcConfiguration>,
    descriptor: Arc<OperationDescriptor>,
    parameters: Vec<RpcValue>,
    id: String,
    token: CancellationToken,
    status: Mutex<RequestStatus>,
    retry_count: AtomicU32,
    last_submitted: Mutex<Option<Instant>>,
}

impl RpcRequest {
    fn new(
        configuration: Arc<RpcConfiguration>,
        descriptor: Arc<OperationDescriptor>,
        parameters: Vec<RpcValue>,
    ) -> Self {
        let id = (descriptor.policy().request_id)();
        let request = Self {
            configuration,
            descriptor,
            parameters,
            id,
            token: CancellationToken::new(),
            status: Mutex::new(RequestStatus::Created),
            retry_count: AtomicU32::new(0),
            last_submitted: Mutex::new(None),
        };
        request.emit_snapshot();
        request
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> RequestStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> RequestSnapshot {
        RequestSnapshot {
            id: self.id.clone(),
            status: self.status(),
            retry_count: self.retry_count(),
        }
    }

    /// Handle that disposes this request when cancelled.
    pub fn cancellation(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Drive the request to settlement. Disposal wins over any concurrent
    /// transition; a fulfillment arriving after disposal is discarded.
    pub async fn response(self) -> Result<RpcValue> {
        let token = self.token.clone();
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                self.set_status(RequestStatus::Disposed);
                debug!(id = %self.id, "request disposed");
                Err(RpcError::Disposed)
            }
            result = self.drive() => result,
        }
    }

    async fn drive(&self) -> Result<RpcValue> {
        let interface = self.descriptor.interface_name().to_string();
        let operation = self.descriptor.operation_name().to_string();
        let policy = self.descriptor.policy().clone();

        let parameters = self.configuration.registry().with_types(|types| {
            RpcMarshaler::new(&interface, types)
                .serialize(&RpcValue::Array(self.parameters.clone()))
        })?;
        let serialized_operation = SerializedOperation {
            interface_definition: interface.clone(),
            operation_name: operation.clone(),
            interface_version: self.descriptor.interface_version().to_string(),
        };
        let (method, path) = self
            .configuration
            .protocol()
            .request_route(&serialized_operation);
        let request = SerializedRequest {
            id: self.id.clone(),
            operation: serialized_operation,
            method,
            path,
            parameters,
            authorization: (policy.token)(&self.parameters),
        };

        let mut not_found_retried = false;
        loop {
            self.set_status(RequestStatus::Submitted);
            *self
                .last_submitted
                .lock()
                .unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
            debug!(
                id = %self.id,
                interface = %interface,
                operation = %operation,
                retry = self.retry_count(),
                "submitting request"
            );

            let fulfillment = self.configuration.protocol().fulfill(request.clone()).await?;

            if self.token.is_cancelled() {
                debug!(id = %self.id, "discarding late fulfillment for disposed request");
                return Err(RpcError::Disposed);
            }
            if fulfillment.id != self.id {
                warn!(
                    id = %self.id,
                    received = %fulfillment.id,
                    "fulfillment id mismatch"
                );
                return Err(RpcError::Transport {
                    message: format!(
                        "fulfillment id {} does not match request id {}",
                        fulfillment.id, self.id
                    ),
                });
            }

            match fulfillment.status {
                RequestStatus::Resolved => {
                    self.set_status(RequestStatus::Resolved);
                    return self.deserialize_result(&interface, &fulfillment);
                }
                RequestStatus::Rejected => {
                    self.set_status(RequestStatus::Rejected);
                    return Err(self.decode_rejection(&interface, &fulfillment));
                }
                RequestStatus::Pending => {
                    self.set_status(RequestStatus::Pending);
                    let interval = (policy.retry_interval)(&self.configuration);
                    debug!(
                        id = %self.id,
                        interval_ms = interval.as_millis() as u64,
                        "pending; resubmitting with the same id after interval"
                    );
                    tokio::time::sleep(interval).await;
                    self.retry_count.fetch_add(1, Ordering::SeqCst);
                }
                RequestStatus::NotFound => {
                    self.set_status(RequestStatus::NotFound);
                    if not_found_retried {
                        return Err(RpcError::OperationNotFound {
                            interface: interface.clone(),
                            operation: operation.clone(),
                        });
                    }
                    not_found_retried = true;
                    if let Some(hook) = self.configuration.not_found_recovery() {
                        hook(interface.clone()).await;
                    }
                    self.retry_count.fetch_add(1, Ordering::SeqCst);
                }
                other => {
                    return Err(RpcError::Transport {
                        message: format!("unexpected fulfillment status: {other:?}"),
                    });
                }
            }
        }
    }

    fn deserialize_result(&self, interface: &str, fulfillment: &Fulfillment) -> Result<RpcValue> {
        let strict = self.configuration.strict_marshaling();
        self.configuration.registry().with_types(|types| {
            RpcMarshaler::new(interface, types)
                .with_strict(strict)
                .deserialize(&fulfillment.result)
        })
    }

    /// Rebuild the backend's exception from a rejected fulfillment.
    fn decode_rejection(&self, interface: &str, fulfillment: &Fulfillment) -> RpcError {
        match self.deserialize_result(interface, fulfillment) {
            Ok(RpcValue::Error(error)) => RpcError::Backend {
                name: error.name,
                message: error.message,
                stack: error.stack,
            },
            Ok(other) => RpcError::Backend {
                name: "Error".to_string(),
                message: format!("rejected with non-error payload: {other:?}"),
                stack: None,
            },
            // Marshaling faults keep their own identity.
            Err(err) => err,
        }
    }

    fn set_status(&self, status: RequestStatus) {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = status;
        self.emit_snapshot();
    }

    fn emit_snapshot(&self) {
        (self.descriptor.policy().request_callback)(&self.snapshot());
    }
}

impl std::fmt::Debug for RpcRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcRequest")
            .field("id", &self.id)
            .field("interface", &self.descriptor.interface_name())
            .field("operation", &self.descriptor.operation_name())
            .field("status", &self.status())
            .field("retry_count", &self.retry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::InterfaceDefinition;
    use crate::protocol::local::LocalProtocol;
    use crate::registry::RpcRegistry;

    fn client() -> RpcClient {
        let registry = Arc::new(RpcRegistry::new());
        registry.initialize();
        let configuration = RpcConfiguration::new(registry, LocalProtocol::new())
            .manage(
                InterfaceDefinition::new("Echo", "1.0.0")
                    .unwrap()
                    .with_operation("ping"),
            )
            .unwrap()
            .activate();
        RpcClient::new(configuration)
    }

    #[test]
    fn test_new_request_is_created_with_unique_id() {
        let client = client();
        let a = client.request("Echo", "ping", vec![]).unwrap();
        let b = client.request("Echo", "ping", vec![]).unwrap();
        assert_eq!(a.status(), RequestStatus::Created);
        assert_eq!(a.retry_count(), 0);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_request_for_unknown_operation_fails_upfront() {
        let client = client();
        let err = client.request("Echo", "shout", vec![]).unwrap_err();
        assert!(matches!(err, RpcError::OperationNotFound { .. }));
    }

    #[tokio::test]
    async fn test_disposal_wins_over_submission() {
        let client = client();
        let request = client.request("Echo", "ping", vec![]).unwrap();
        request.cancellation().cancel();
        let err = request.response().await.unwrap_err();
        assert!(matches!(err, RpcError::Disposed));
    }
}
