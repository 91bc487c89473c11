//! Protocol contract: the abstraction every transport implements, plus the
//! logical envelope exchanged between the client and backend layers.
//!
//! This crate never defines the wire bytes of a concrete transport; it only
//! fixes the JSON shapes of [`SerializedRequest`] and [`Fulfillment`] and
//! the status codes both ends agree on.

pub mod local;

use crate::configuration::RpcConfiguration;
use crate::error::Result;
use crate::marshal::SerializedEnvelope;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Client-observable request status. Integer codes are stable within one
/// configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum RequestStatus {
    Unknown = 0,
    Created = 1,
    Submitted = 2,
    Pending = 3,
    Resolved = 4,
    Rejected = 5,
    Disposed = 6,
    NotFound = 7,
}

impl From<RequestStatus> for u8 {
    fn from(status: RequestStatus) -> Self {
        status as u8
    }
}

impl TryFrom<u8> for RequestStatus {
    type Error = String;

    fn try_from(code: u8) -> std::result::Result<Self, Self::Error> {
        match code {
            0 => Ok(RequestStatus::Unknown),
            1 => Ok(RequestStatus::Created),
            2 => Ok(RequestStatus::Submitted),
            3 => Ok(RequestStatus::Pending),
            4 => Ok(RequestStatus::Resolved),
            5 => Ok(RequestStatus::Rejected),
            6 => Ok(RequestStatus::Disposed),
            7 => Ok(RequestStatus::NotFound),
            other => Err(format!("unknown request status code: {other}")),
        }
    }
}

/// Identity of the operation a request targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedOperation {
    pub interface_definition: String,
    pub operation_name: String,
    pub interface_version: String,
}

/// One outgoing call, flattened for transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedRequest {
    /// Unique among in-flight requests on one logical connection.
    pub id: String,
    pub operation: SerializedOperation,
    /// Transport-assigned verb; the in-process protocol uses a placeholder.
    pub method: String,
    /// Transport-assigned route; the in-process protocol uses a placeholder.
    pub path: String,
    pub parameters: SerializedEnvelope,
    /// Access token lifted from the parameters by the operation's policy.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub authorization: Option<String>,
}

/// The backend's answer to one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fulfillment {
    pub result: SerializedEnvelope,
    pub status: RequestStatus,
    /// Echoes the originating request id.
    pub id: String,
    pub interface_name: String,
}

/// The contract every transport must satisfy.
///
/// `fulfill` runs a request end-to-end and is the only required method; the
/// framing helpers have JSON defaults that concrete transports may override
/// with their own wire format.
#[async_trait]
pub trait Protocol: Send + Sync {
    /// Flatten a request into wire bytes.
    fn serialize_request(&self, request: &SerializedRequest) -> Result<Vec<u8>> {
        serde_json::to_vec(request).map_err(Into::into)
    }

    /// Rebuild a request from wire bytes.
    fn deserialize_request(&self, bytes: &[u8]) -> Result<SerializedRequest> {
        serde_json::from_slice(bytes).map_err(Into::into)
    }

    /// Transport-assigned (method, path) for an operation.
    fn request_route(&self, operation: &SerializedOperation) -> (String, String) {
        (
            "post".to_string(),
            format!(
                "/rpc/{}/{}/{}",
                operation.interface_definition,
                operation.interface_version,
                operation.operation_name
            ),
        )
    }

    /// Deliver a request and produce its fulfillment. An `Err` here is a
    /// transport or marshaling failure, never an application outcome.
    async fn fulfill(&self, request: SerializedRequest) -> Result<Fulfillment>;

    /// Called once when a configuration takes ownership of this protocol.
    fn attach(&self, _configuration: &Arc<RpcConfiguration>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_codes_are_stable() {
        let codes: Vec<u8> = [
            RequestStatus::Unknown,
            RequestStatus::Created,
            RequestStatus::Submitted,
            RequestStatus::Pending,
            RequestStatus::Resolved,
            RequestStatus::Rejected,
            RequestStatus::Disposed,
            RequestStatus::NotFound,
        ]
        .into_iter()
        .map(u8::from)
        .collect();
        assert_eq!(codes, vec![0, 1, 2, 3, 4, 5, 6, 7]);
        for code in codes {
            let status = RequestStatus::try_from(code).unwrap();
            assert_eq!(u8::from(status), code);
        }
        assert!(RequestStatus::try_from(99).is_err());
    }

    #[test]
    fn test_serialized_request_wire_shape() {
        let request = SerializedRequest {
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
        };
        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(wire["id"], json!("r-1"));
        assert_eq!(wire["operation"]["interfaceDefinition"], json!("Echo"));
        assert_eq!(wire["operation"]["operationName"], json!("ping"));
        assert_eq!(wire["operation"]["interfaceVersion"], json!("1.0.0"));
        assert!(wire.get("authorization").is_none());

        let back: SerializedRequest = serde_json::from_value(wire).unwrap();
        assert_eq!(back, request);
    }

    #[test]
    fn test_fulfillment_status_serializes_as_integer() {
        let fulfillment = Fulfillment {
            result: SerializedEnvelope::empty(),
            status: RequestStatus::Resolved,
            id: "r-1".into(),
            interface_name: "Echo".into(),
        };
        let wire = serde_json::to_value(&fulfillment).unwrap();
        assert_eq!(wire["status"], json!(4));
        assert_eq!(wire["interfaceName"], json!("Echo"));
    }
}
