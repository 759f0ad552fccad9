//! Networking helpers: address resolution, TLS config, and connection limiting.

pub mod address;
pub mod limiter;
pub mod tls;

pub use address::{AddressError, resolve};
pub use limiter::LimitedListener;
pub use tls::{TlsConfigError, client_tls_config, server_tls_config};
