//! # rpc-server
//!
//! An embeddable Connect RPC server built on [Axum](https://github.com/tokio-rs/axum)
//! and [Tonic](https://github.com/hyperium/tonic): one process, one port, speaking
//! gRPC, gRPC-Web, and Connect (JSON or protobuf over plain HTTP) to the same
//! handlers.
//!
//! ## Modules
//!
//! - [`context`]: per-request protocol/compression/limits state (`ConnectContext`)
//! - [`layer`]: `ConnectLayer`/`BridgeLayer` Tower middleware that builds it
//! - [`message`]: request/response extraction, encoding, and the wire error type
//! - [`metadata`]: protocol-neutral metadata map and auth-token parsing
//! - [`net`]: address resolution, TLS config, and connection limiting
//! - [`interceptor`]: the interceptor library (auth, rate limiting, panic
//!   recovery, validation, observability, metrics)
//! - [`gateway`]: REST gateway translating HTTP calls into RPC calls on an
//!   internal client connection
//! - [`service_builder`]: `MakeServiceBuilder`, composes a gRPC service with an
//!   Axum `Router` behind one `MakeService`
//! - [`tonic`]: `ContentTypeSwitch`, the HTTP/2-vs-everything-else dispatcher
//! - [`health`]: the built-in `HealthProbe`/`HealthService`
//! - [`server`]: `ServerBuilder`/`Server`, the embeddable server's
//!   configuration and `Start`/`Stop` lifecycle

pub mod context;
pub mod gateway;
pub mod health;
pub mod interceptor;
pub mod layer;
pub mod message;
pub mod metadata;
pub mod mux;
pub mod net;
pub mod server;
pub mod service_builder;
pub mod tonic;

pub use context::{ConnectContext, ContextError, MessageLimits, ProtocolConfig, RequestProtocol};
pub use gateway::{Gateway, GatewayConfig, GatewayError, HttpServiceProvider};
pub use health::{HealthError, HealthProbe, HealthService, ServingStatus};
pub use interceptor::{
    AuthLayer, ObservabilityLayer, PanicRecoveryLayer, RateLimitLayer, Validatable,
    validate_or_reject,
};
pub use layer::{BridgeLayer, ConnectLayer};
pub use message::error::{Code, ConnectError};
pub use message::{ConnectRequest, ConnectResponse, StreamBody, Streaming};
pub use metadata::{Metadata, get_auth_token};
pub use server::{
    BindAddress, ResourceLimits, Server, ServerBuilder, ServerConfig, ServerError, ServerState,
    ServiceProvider, ServiceRegistrar, TlsMaterial, build_chain,
};
pub use service_builder::MakeServiceBuilder;
pub use tonic::ContentTypeSwitch;

// Re-export crates that appear in generated handler signatures so downstream
// crates don't need to depend on them directly.
pub use bytes;
pub use futures;
pub use prost;
pub use serde;

pub mod prelude {
    //! The common set of imports a handler file needs.
    pub use crate::context::ConnectContext;
    pub use crate::layer::ConnectLayer;
    pub use crate::message::error::{Code, ConnectError};
    pub use crate::message::{ConnectRequest, ConnectResponse, StreamBody, Streaming};
}
