//! Per-service registration surface.
//!
//! Every RPC service implements [`ServiceProvider`] once; [`Server::start`](super::Server::start)
//! hands each one a [`ServiceRegistrar`] to mount its Connect router (and,
//! behind the `tonic` feature, its gRPC service) onto.

use axum::Router;

use crate::gateway::HttpServiceProvider;

/// Registered once per RPC service.
///
/// A service that also exposes REST gateway routes implements
/// [`HttpServiceProvider`] on the same type and overrides
/// [`as_http_service_provider`](Self::as_http_service_provider) to return
/// itself. This is a second, independently-implementable trait rather than
/// `Any`-based runtime reflection (see the design note on capability checks
/// in [`crate::gateway`]): [`Gateway::build_router`](crate::gateway::Gateway::build_router)
/// discovers gateway-capable services through this downcast.
pub trait ServiceProvider: Send + Sync {
    fn server_setup(&self, registrar: &mut ServiceRegistrar);

    fn as_http_service_provider(&self) -> Option<&dyn HttpServiceProvider> {
        None
    }
}

/// Accumulates Connect routers and gRPC services across every registered
/// [`ServiceProvider`] before [`Server::start`](super::Server::start)
/// assembles the final dispatch service.
pub struct ServiceRegistrar {
    router: Router<()>,
    #[cfg(feature = "tonic")]
    grpc_routes: tonic::service::Routes,
}

impl ServiceRegistrar {
    pub(crate) fn new() -> Self {
        Self {
            router: Router::new(),
            #[cfg(feature = "tonic")]
            grpc_routes: tonic::service::Routes::default(),
        }
    }

    /// Mounts a Connect RPC router, merging it with any previously
    /// registered ones.
    pub fn add_router(&mut self, router: Router<()>) -> &mut Self {
        let current = std::mem::replace(&mut self.router, Router::new());
        self.router = current.merge(router);
        self
    }
}

#[cfg(feature = "tonic")]
impl ServiceRegistrar {
    /// Mounts a gRPC service, routed by its `NamedService::NAME`.
    pub fn add_grpc_service<G>(&mut self, svc: G) -> &mut Self
    where
        G: tower::Service<http::Request<tonic::body::Body>, Error = std::convert::Infallible>
            + tonic::server::NamedService
            + Clone
            + Send
            + Sync
            + 'static,
        G::Response: axum::response::IntoResponse,
        G::Future: Send + 'static,
    {
        let current = std::mem::take(&mut self.grpc_routes);
        self.grpc_routes = current.add_service(svc);
        self
    }

    pub(crate) fn into_parts(self) -> (Router<()>, tonic::service::Routes) {
        (self.router, self.grpc_routes)
    }
}

#[cfg(not(feature = "tonic"))]
impl ServiceRegistrar {
    pub(crate) fn into_parts(self) -> Router<()> {
        self.router
    }
}
