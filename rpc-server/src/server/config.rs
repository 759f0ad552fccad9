//! Server configuration: bind target, TLS policy, resource limits, and the
//! pieces handed to [`super::build_chain`] and [`super::Server::start`].

use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};

use super::chain::{BoxStreamInterceptor, BoxUnaryInterceptor};
use super::registrar::ServiceProvider;
use crate::gateway::GatewayConfig;
use crate::health::HealthProbe;
use crate::interceptor::TokenValidator;

/// Where the server's main listener binds.
#[derive(Debug, Clone)]
pub enum BindAddress {
    Tcp { host: String, port: u16 },
    Unix(std::path::PathBuf),
}

impl BindAddress {
    /// The externally-facing endpoint string: `unix://<path>` or `<host>:<port>`.
    pub fn endpoint(&self) -> String {
        match self {
            BindAddress::Tcp { host, port } => format!("{host}:{port}"),
            BindAddress::Unix(path) => format!("unix://{}", path.display()),
        }
    }
}

/// Already-parsed TLS material plus the client-CA trust anchor.
///
/// A non-empty `client_cas` flips [`crate::net::tls::server_tls_config`]
/// into `requireAndVerifyClientCert` policy.
pub struct TlsMaterial {
    pub cert_chain: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
    pub client_cas: Vec<CertificateDer<'static>>,
}

/// Connection/request/rate ceilings. `0` means unlimited for that
/// dimension; the rate-limit burst is `max(1, requests_per_second / 5)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceLimits {
    pub connections: u32,
    pub requests_per_connection: u32,
    pub requests_per_second: u32,
}

impl ResourceLimits {
    /// Token-bucket burst size for [`crate::interceptor::RateLimitLayer`].
    pub fn burst(&self) -> u32 {
        (self.requests_per_second / 5).max(1)
    }
}

/// Aggregate server configuration: bind address, TLS policy, resource
/// limits, the fixed and user interceptor slots, registered services, an
/// optional health probe, and an optional colocated gateway.
///
/// Built by [`ServerBuilder`], consumed once by
/// [`super::Server::start`](super::lifecycle::Server::start); immutable
/// afterwards.
pub struct ServerConfig {
    pub bind: BindAddress,
    pub tls: Option<TlsMaterial>,
    pub limits: ResourceLimits,
    pub token_validator: Option<Arc<dyn TokenValidator>>,
    pub unary_interceptors: Vec<BoxUnaryInterceptor>,
    pub stream_interceptors: Vec<BoxStreamInterceptor>,
    pub services: Vec<Arc<dyn ServiceProvider>>,
    pub health_probe: Option<Arc<dyn HealthProbe>>,
    pub gateway: Option<GatewayConfig>,
    pub reflection: bool,
    pub input_validation: bool,
    pub panic_recovery: bool,
}

impl ServerConfig {
    pub fn builder(bind: BindAddress) -> ServerBuilder {
        ServerBuilder::new(bind)
    }
}

/// Fluent builder for [`ServerConfig`].
pub struct ServerBuilder {
    config: ServerConfig,
}

impl ServerBuilder {
    pub fn new(bind: BindAddress) -> Self {
        Self {
            config: ServerConfig {
                bind,
                tls: None,
                limits: ResourceLimits::default(),
                token_validator: None,
                unary_interceptors: Vec::new(),
                stream_interceptors: Vec::new(),
                services: Vec::new(),
                health_probe: None,
                gateway: None,
                reflection: false,
                input_validation: true,
                panic_recovery: true,
            },
        }
    }

    pub fn tls(mut self, tls: TlsMaterial) -> Self {
        self.config.tls = Some(tls);
        self
    }

    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.config.limits = limits;
        self
    }

    pub fn token_validator(mut self, validator: Arc<dyn TokenValidator>) -> Self {
        self.config.token_validator = Some(validator);
        self
    }

    pub fn add_unary_interceptor(mut self, interceptor: BoxUnaryInterceptor) -> Self {
        self.config.unary_interceptors.push(interceptor);
        self
    }

    pub fn add_stream_interceptor(mut self, interceptor: BoxStreamInterceptor) -> Self {
        self.config.stream_interceptors.push(interceptor);
        self
    }

    pub fn add_service(mut self, service: Arc<dyn ServiceProvider>) -> Self {
        self.config.services.push(service);
        self
    }

    pub fn health_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.config.health_probe = Some(probe);
        self
    }

    pub fn gateway(mut self, gateway: GatewayConfig) -> Self {
        self.config.gateway = Some(gateway);
        self
    }

    pub fn reflection(mut self, enabled: bool) -> Self {
        self.config.reflection = enabled;
        self
    }

    /// Enable or disable the `Validatable` check run by the `ConnectRequest`
    /// extractors after decoding. Enabled by default.
    pub fn input_validation(mut self, enabled: bool) -> Self {
        self.config.input_validation = enabled;
        self
    }

    pub fn panic_recovery(mut self, enabled: bool) -> Self {
        self.config.panic_recovery = enabled;
        self
    }

    /// Applies the TLS client-CA merge (the one cross-field invariant in
    /// [`ServerConfig`]) and returns the finished config. Everything else
    /// is resolved field-by-field at the call site, so there is nothing
    /// else to reconcile here.
    pub fn build(self) -> ServerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_floors_to_one() {
        let limits = ResourceLimits { connections: 0, requests_per_connection: 0, requests_per_second: 2 };
        assert_eq!(limits.burst(), 1);
    }

    #[test]
    fn burst_is_a_fifth_of_rps() {
        let limits = ResourceLimits { connections: 0, requests_per_connection: 0, requests_per_second: 100 };
        assert_eq!(limits.burst(), 20);
    }

    #[test]
    fn tcp_endpoint_is_host_colon_port() {
        let bind = BindAddress::Tcp { host: "0.0.0.0".into(), port: 8080 };
        assert_eq!(bind.endpoint(), "0.0.0.0:8080");
    }

    #[test]
    fn unix_endpoint_has_scheme_prefix() {
        let bind = BindAddress::Unix("/tmp/rpc.sock".into());
        assert_eq!(bind.endpoint(), "unix:///tmp/rpc.sock");
    }

    #[test]
    fn builder_defaults_panic_recovery_on() {
        let config = ServerBuilder::new(BindAddress::Tcp { host: "local".into(), port: 0 }).build();
        assert!(config.panic_recovery);
        assert!(config.services.is_empty());
    }
}
