//! Gantry RPC - transport-agnostic RPC call and marshaling runtime.
//!
//! Lets a frontend process invoke a method of a backend service through an
//! abstraction that is indifferent to whether the transport is an HTTP
//! boundary, an inter-process channel, or an in-process direct call. The
//! crate provides the versioned interface registry, the client request
//! state machine with pending/retry semantics, the backend invocation
//! dispatcher with version gating, and the structured value codec that
//! carries class identity, binary payloads, `Map`/`Set` semantics and
//! errors across the serialization boundary.
//!
//! Concrete transports implement [`protocol::Protocol`]; the bundled
//! [`protocol::local::LocalProtocol`] composes frontend and backend in one
//! process.
//!
//! # Example
//!
//! ```rust,ignore
//! use gantry_rpc::{
//!     InterfaceDefinition, LocalProtocol, RpcClient, RpcConfiguration, RpcRegistry,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> gantry_rpc::Result<()> {
//!     let registry = Arc::new(RpcRegistry::new());
//!     registry.initialize();
//!
//!     let configuration = RpcConfiguration::new(registry.clone(), LocalProtocol::new())
//!         .manage(InterfaceDefinition::new("Echo", "1.0.0")?.with_operation("ping"))?
//!         .activate();
//!     registry.register_impl("Echo", Arc::new(EchoImpl))?;
//!
//!     let client = RpcClient::new(configuration);
//!     let reply = client.call("Echo", "ping", vec!["hello".into()]).await?;
//!     println!("{reply:?}");
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod configuration;
pub mod error;
pub mod interface;
pub mod invocation;
pub mod marshal;
pub mod operation;
pub mod protocol;
pub mod registry;
pub mod request;
pub mod value;

// Re-export commonly used types
pub use cancel::{CancellationToken, CancelledError};
pub use configuration::{ActivationHook, NotFoundRecovery, RpcConfiguration};
pub use error::{Result, RpcError};
pub use interface::InterfaceDefinition;
pub use invocation::{Invocation, InvocationContext, RpcImpl};
pub use marshal::{
    MarshalType, MarshalTypeRegistry, RpcMarshaler, SerializedEnvelope, DEFAULT_BINARY_KIND,
};
pub use operation::{
    InvocationSnapshot, OperationDescriptor, OperationPolicy, RequestSnapshot, ACCESS_TOKEN_TYPE,
};
pub use protocol::local::LocalProtocol;
pub use protocol::{Fulfillment, Protocol, RequestStatus, SerializedOperation, SerializedRequest};
pub use registry::RpcRegistry;
pub use request::{RpcClient, RpcRequest};
pub use value::{BinaryValue, ErrorValue, InstanceValue, RpcValue};
