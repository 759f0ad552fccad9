//! HTTP gateway: REST access to the colocated RPC server.
//!
//! [`Gateway`] holds an optional dedicated port, a persistent internal
//! [`ConnectClient`] connected back to the RPC server over loopback, the
//! per-MIME marshalers, middleware/interceptor stack, and custom routes
//! described by [`GatewayConfig`]. Each [`HttpServiceProvider`] registered
//! with the server gets `(Router, Arc<ConnectClient>)` to mount its REST
//! routes, which proxy through the client exactly like an external caller
//! would.
//!
//! Lifecycle:
//! 1. [`Gateway::connect`] dials the internal client.
//! 2. [`Gateway::build_router`] mounts service routes (3), negotiates the
//!    response body against the registered marshaler table and strips
//!    hop-by-hop headers ([`MarshalLayer`]), wraps the result with the
//!    pre-dispatch interceptor chain (4), adds custom routes (5), and
//!    applies user middleware outermost-first (6).
//! 3. A WebSocket proxy (7), where configured, is mounted as an ordinary
//!    route by the service that needs it (see [`ws_proxy`] for why this
//!    can't be a universal outermost wrapper in a statically-typed client).

mod error;
mod header;
mod marshaler;
mod types;
pub mod ws_proxy;

pub use error::GatewayError;
pub use header::filter_hop_by_hop;
pub use marshaler::{JsonMarshaler, Marshaler, PrettyJsonMarshaler};
pub use types::{
    BoxHttpMiddleware, BoxPreDispatchInterceptor, CustomRoute, GatewayRegisterFn,
    HttpServiceProvider, MarshalLayer, PreDispatchInterceptor, PreDispatchLayer, ResponseMutator,
    ResponseMutatorLayer,
};

use std::collections::HashMap;
use std::sync::Arc;

use mime::Mime;
use rpc_client::ConnectClient;
use tower::Layer;

/// Configuration for an [`Gateway`], built once and handed to
/// [`crate::server::ServerBuilder`].
pub struct GatewayConfig {
    /// Dedicated TCP port; `0` means "share the RPC listener".
    pub port: u16,
    pub marshalers: HashMap<Mime, Arc<dyn Marshaler>>,
    pub middleware: Vec<BoxHttpMiddleware>,
    pub pre_dispatch: Vec<BoxPreDispatchInterceptor>,
    pub response_mutator: Option<Arc<dyn ResponseMutator>>,
    pub custom_routes: Vec<CustomRoute>,
    pub span_name: Option<String>,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("port", &self.port)
            .field("marshalers", &self.marshalers.keys().collect::<Vec<_>>())
            .field("middleware_count", &self.middleware.len())
            .field("pre_dispatch_count", &self.pre_dispatch.len())
            .field("has_response_mutator", &self.response_mutator.is_some())
            .field("custom_route_count", &self.custom_routes.len())
            .field("span_name", &self.span_name)
            .finish()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let mut marshalers: HashMap<Mime, Arc<dyn Marshaler>> = HashMap::new();
        marshalers.insert(mime::APPLICATION_JSON, Arc::new(JsonMarshaler));
        Self {
            port: 0,
            marshalers,
            middleware: Vec::new(),
            pre_dispatch: Vec::new(),
            response_mutator: None,
            custom_routes: Vec::new(),
            span_name: None,
        }
    }
}

impl GatewayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Registers the `application/json+pretty` convenience marshaler.
    pub fn with_pretty_json(mut self) -> Self {
        let pretty: Mime = "application/json+pretty"
            .parse()
            .expect("application/json+pretty is a valid MIME type");
        self.marshalers.insert(pretty, Arc::new(PrettyJsonMarshaler));
        self
    }

    pub fn with_marshaler(mut self, mime: Mime, marshaler: Arc<dyn Marshaler>) -> Self {
        self.marshalers.insert(mime, marshaler);
        self
    }

    pub fn with_middleware(mut self, middleware: BoxHttpMiddleware) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn with_pre_dispatch(mut self, interceptor: BoxPreDispatchInterceptor) -> Self {
        self.pre_dispatch.push(interceptor);
        self
    }

    pub fn with_response_mutator(mut self, mutator: Arc<dyn ResponseMutator>) -> Self {
        self.response_mutator = Some(mutator);
        self
    }

    pub fn with_custom_route(mut self, route: CustomRoute) -> Self {
        self.custom_routes.push(route);
        self
    }

    pub fn with_span_name(mut self, name: impl Into<String>) -> Self {
        self.span_name = Some(name.into());
        self
    }
}

/// An HTTP gateway exposing REST access to the colocated RPC server.
pub struct Gateway {
    config: GatewayConfig,
    client: Option<Arc<ConnectClient>>,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config, client: None }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Dials the internal client connection to the colocated RPC server.
    ///
    /// `endpoint` is loopback TCP for a TCP RPC server, or the assigned
    /// loopback port when the RPC server itself listens on a Unix socket --
    /// `rpc-server::server` resolves that address before calling this.
    pub fn connect(&mut self, endpoint: &str) -> Result<Arc<ConnectClient>, GatewayError> {
        let client = ConnectClient::builder(endpoint).build()?;
        let client = Arc::new(client);
        self.client = Some(client.clone());
        Ok(client)
    }

    pub fn client(&self) -> Option<&Arc<ConnectClient>> {
        self.client.as_ref()
    }

    /// Builds the gateway's Axum router: service routes, then the
    /// pre-dispatch chain, then custom routes, then user middleware
    /// (outermost-first), then the response mutator.
    pub fn build_router(
        &self,
        providers: &[&dyn HttpServiceProvider],
    ) -> Result<axum::Router, GatewayError> {
        let client = self.client.clone().ok_or(GatewayError::NotConnected)?;

        let mut router = axum::Router::new();
        for provider in providers {
            if let Some(register) = provider.gateway_setup() {
                router = register(router, client.clone());
            }
        }

        for route in &self.config.custom_routes {
            router = router.route(&route.path, route.handler.clone());
        }

        // Content-negotiate the response body against the registered
        // marshaler table and strip hop-by-hop headers, closest to the
        // routes so custom routes get the same treatment as proxied ones.
        router = router.layer(MarshalLayer::new(self.config.marshalers.clone()));

        if !self.config.pre_dispatch.is_empty() {
            router = router.layer(PreDispatchLayer::new(self.config.pre_dispatch.clone()));
        }

        for middleware in &self.config.middleware {
            router = router.layer(middleware.clone());
        }

        if let Some(mutator) = &self.config.response_mutator {
            router = router.layer(ResponseMutatorLayer::new(mutator.clone()));
        }

        Ok(router)
    }

    /// Closes the internal client connection. Idempotent.
    pub fn shutdown(&mut self) {
        self.client = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_registers_json_marshaler() {
        let config = GatewayConfig::default();
        assert!(config.marshalers.contains_key(&mime::APPLICATION_JSON));
    }

    #[test]
    fn with_pretty_json_adds_second_marshaler() {
        let config = GatewayConfig::new().with_pretty_json();
        assert_eq!(config.marshalers.len(), 2);
    }

    #[test]
    fn build_router_without_connect_fails() {
        let gateway = Gateway::new(GatewayConfig::new());
        assert!(matches!(
            gateway.build_router(&[]),
            Err(GatewayError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn build_router_succeeds_after_connect() {
        let mut gateway = Gateway::new(GatewayConfig::new());
        gateway.connect("http://127.0.0.1:0").unwrap();
        assert!(gateway.client().is_some());
        let router = gateway.build_router(&[]);
        assert!(router.is_ok());
    }

    #[test]
    fn shutdown_clears_client() {
        let mut gateway = Gateway::new(GatewayConfig::new());
        gateway.connect("http://127.0.0.1:0").unwrap();
        gateway.shutdown();
        assert!(gateway.client().is_none());
    }
}
