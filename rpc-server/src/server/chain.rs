//! Fixed interceptor chain assembly.
//!
//! [`build_chain`] wraps a service router with the framework's fixed
//! interceptors plus the two user-registered slots: rate limiting is the
//! pre-dispatch admission filter, so it sits outermost of everything,
//! including observability (a rejected call was never dispatched and
//! shouldn't be measured as one); then observability and Prometheus
//! (so they measure the full call including every interceptor below them),
//! then authentication, then the user's own unary/stream interceptors in
//! registration order, then panic recovery (always innermost, so it
//! recovers a panic raised anywhere above it as well as in the handler).
//! Decoded-message validation isn't part of this chain: it runs inside the
//! `ConnectRequest` extractors in `message/request.rs`, since a
//! `Request<Body>`-level layer can't see the decoded message type (see
//! `interceptor::validation`).

use axum::Router;
use axum::http::Request;
use axum::body::Body;
use axum::response::Response;
use axum::routing::Route;
use tower::layer::util::BoxLayer;

use crate::interceptor::{AuthLayer, ObservabilityLayer, PanicRecoveryLayer, RateLimitLayer};

#[cfg(feature = "metrics")]
use crate::interceptor::PrometheusLayer;

use super::config::ServerConfig;

/// A boxed, type-erased HTTP middleware layer for a unary-registered user
/// interceptor. Unary and stream interceptors share the same HTTP-level
/// shape in this framework (both see the same `Request<Body>`/`Response`
/// pair; streaming is distinguished by [`crate::context::RequestProtocol`]
/// in extensions, not by a different `Service` signature), so the two
/// registration slots are kept as two separate `Vec`s for registration-order
/// bookkeeping rather than two different Rust types.
pub type BoxUnaryInterceptor = BoxLayer<Route, Request<Body>, Response, std::convert::Infallible>;

/// See [`BoxUnaryInterceptor`].
pub type BoxStreamInterceptor = BoxUnaryInterceptor;

/// Assembles the fixed interceptor chain around `router`, in outermost-to-
/// innermost order: rate limiting (if `limits.requests_per_second != 0`),
/// observability, Prometheus (if the `metrics` feature is enabled),
/// authentication (if a token validator is configured), user-registered
/// interceptors (registration order), user-custom interceptors
/// (registration order), panic recovery (if enabled).
///
/// Each `Router::layer` call wraps the *previous* result, so building this
/// outermost-first list means applying `.layer()` calls in reverse: the
/// first call here is the one closest to the handler.
pub fn build_chain(router: Router<()>, config: &ServerConfig) -> Router<()> {
    let mut router = router;

    if config.panic_recovery {
        router = router.layer(PanicRecoveryLayer::new());
    }

    for interceptor in config.stream_interceptors.iter().rev() {
        router = router.layer(interceptor.clone());
    }

    for interceptor in config.unary_interceptors.iter().rev() {
        router = router.layer(interceptor.clone());
    }

    if let Some(validator) = &config.token_validator {
        router = router.layer(AuthLayer::new(validator.clone()));
    }

    #[cfg(feature = "metrics")]
    {
        router = router.layer(PrometheusLayer::new());
    }

    router = router.layer(ObservabilityLayer::new());

    if config.limits.requests_per_second != 0 {
        router = router.layer(RateLimitLayer::new(config.limits.requests_per_second));
    }

    router
}
