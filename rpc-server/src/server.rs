//! The embeddable server: configuration, service registration, the fixed
//! interceptor chain, and the `Start`/`Stop` lifecycle.
//!
//! ```ignore
//! let server = ServerBuilder::new(BindAddress::Tcp { host: "0.0.0.0".into(), port: 8080 })
//!     .add_service(Arc::new(MyService))
//!     .build()?;
//! ```

mod chain;
mod config;
mod lifecycle;
mod registrar;

pub use chain::{build_chain, BoxStreamInterceptor, BoxUnaryInterceptor};
pub use config::{BindAddress, ResourceLimits, ServerBuilder, ServerConfig, TlsMaterial};
pub use lifecycle::{Server, ServerError, ServerState};
pub use registrar::{ServiceProvider, ServiceRegistrar};
