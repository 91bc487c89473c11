//! Error types for the Gantry RPC runtime.
//!
//! The taxonomy separates registration-time configuration problems from
//! per-request outcomes and from marshaling faults, which are contract
//! errors and never retried.

use crate::protocol::RequestStatus;
use thiserror::Error;

/// Main error type for the RPC runtime.
#[derive(Debug, Error)]
pub enum RpcError {
    // Registration-time errors
    #[error("Interface not configured: {name}")]
    NotConfigured { name: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    // Per-request errors
    #[error("Incompatible version of {interface}: caller {caller}, callee {callee}")]
    IncompatibleVersion {
        interface: String,
        caller: String,
        callee: String,
    },

    #[error("Operation not found: {interface}.{operation}")]
    OperationNotFound {
        interface: String,
        operation: String,
    },

    #[error("Invalid interface version: {value}")]
    InvalidVersion { value: String },

    /// Backend exception delivered to the caller. The stack is present only
    /// when the backend ran in development mode.
    #[error("{name}: {message}")]
    Backend {
        name: String,
        message: String,
        stack: Option<String>,
    },

    /// Deliberate retry-later signal raised by an implementation. Not a
    /// failure; the request state machine resubmits after the policy's
    /// retry interval.
    #[error("Pending: {message}")]
    Pending { message: String },

    /// Not-found signal raised by an implementation or the dispatcher.
    #[error("Not found: {message}")]
    NotFound { message: String },

    // Marshaling errors
    #[error("Marshaling error: {message}")]
    Marshal {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Request lifecycle
    #[error("Request disposed")]
    Disposed,

    // Transport-reported failures (connection drop, timeout); the transport
    // itself is outside this crate.
    #[error("Transport error: {message}")]
    Transport { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for RPC operations.
pub type Result<T> = std::result::Result<T, RpcError>;

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        RpcError::Marshal {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl RpcError {
    /// Create a marshaling error without an underlying JSON cause.
    pub fn marshal(message: impl Into<String>) -> Self {
        RpcError::Marshal {
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        RpcError::Configuration {
            message: message.into(),
        }
    }

    /// The fulfillment status an invocation outcome maps to.
    pub fn status(&self) -> RequestStatus {
        match self {
            RpcError::Pending { .. } => RequestStatus::Pending,
            RpcError::NotFound { .. }
            | RpcError::OperationNotFound { .. }
            | RpcError::NotConfigured { .. } => RequestStatus::NotFound,
            RpcError::Disposed => RequestStatus::Disposed,
            _ => RequestStatus::Rejected,
        }
    }

    /// Whether this is a marshaling (contract) error. Never retried and
    /// never downgraded to an application-level rejection.
    pub fn is_marshaling(&self) -> bool {
        matches!(self, RpcError::Marshal { .. })
    }

    /// Whether this error was raised at registration time.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RpcError::Configuration { .. } | RpcError::NotConfigured { .. }
        )
    }
}
