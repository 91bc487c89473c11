//! Default in-process protocol: synchronous dispatch through the same
//! codec and dispatcher, no network. Used for testing and for same-process
//! composition of frontend and backend.

use super::{Fulfillment, Protocol, SerializedRequest};
use crate::configuration::RpcConfiguration;
use crate::error::{Result, RpcError};
use crate::invocation::Invocation;
use async_trait::async_trait;
use std::sync::{Arc, OnceLock, Weak};

/// In-process protocol. Holds a weak back-reference to its configuration,
/// set when the configuration activates.
#[derive(Debug, Default)]
pub struct LocalProtocol {
    configuration: OnceLock<Weak<RpcConfiguration>>,
}

impl LocalProtocol {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn configuration(&self) -> Result<Arc<RpcConfiguration>> {
        self.configuration
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| {
                RpcError::configuration("local protocol is not attached to a configuration")
            })
    }
}

#[async_trait]
impl Protocol for LocalProtocol {
    async fn fulfill(&self, request: SerializedRequest) -> Result<Fulfillment> {
        let configuration = self.configuration()?;
        Invocation::new(configuration, request).run().await
    }

    fn attach(&self, configuration: &Arc<RpcConfiguration>) {
        // First attachment wins; a protocol belongs to one configuration.
        let _ = self.configuration.set(Arc::downgrade(configuration));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::SerializedEnvelope;
    use crate::protocol::SerializedOperation;

    fn request() -> SerializedRequest {
        SerializedRequest {
            id: "r-1".into(),
            operation: SerializedOperation {
                interface_definition: "Echo".into(),
                operation_name: "ping".into(),
                interface_version: "1.0.0".into(),
            },
            method: "post".into(),
            path: "/rpc/Echo/1.0.0/ping".into(),
            parameters: SerializedEnvelope::empty(),
            authorization: None,
        }
    }

    #[tokio::test]
    async fn test_fulfill_before_attach_is_configuration_error() {
        let protocol = LocalProtocol::new();
        let err = protocol.fulfill(request()).await.unwrap_err();
        assert!(err.is_configuration());
    }
}
