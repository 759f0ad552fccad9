//! Gateway capability types: middleware, pre-dispatch interceptors, response
//! mutation, custom routes, and the `HttpServiceProvider` registration hook.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{HeaderValue, Request};
use axum::response::Response;
use axum::routing::{MethodRouter, Route};
use mime::Mime;
use rpc_client::ConnectClient;
use tower::layer::util::BoxLayer;
use tower::{Layer, Service};

use super::header::filter_hop_by_hop;
use super::marshaler::Marshaler;

/// A boxed `tower::Layer` applied to the gateway's whole router, in
/// registration order (outermost first matches the first call that
/// registered it).
pub type BoxHttpMiddleware = BoxLayer<Route, Request<Body>, Response, std::convert::Infallible>;

/// Intercepts a request before it reaches the mux; returning `Err` aborts
/// the chain and sends that response directly without calling the next
/// interceptor or the handler.
#[async_trait::async_trait]
pub trait PreDispatchInterceptor: Send + Sync {
    async fn intercept(&self, request: Request<Body>) -> Result<Request<Body>, Response>;
}

pub type BoxPreDispatchInterceptor = Arc<dyn PreDispatchInterceptor>;

/// Rewrites an outgoing response before it leaves the gateway (e.g. to add
/// a header every route needs).
pub trait ResponseMutator: Send + Sync {
    fn mutate(&self, response: Response) -> Response;
}

/// A user-registered route that bypasses marshaler/mux dispatch entirely.
pub struct CustomRoute {
    pub method: axum::http::Method,
    pub path: String,
    pub handler: MethodRouter,
}

impl CustomRoute {
    pub fn new(method: axum::http::Method, path: impl Into<String>, handler: MethodRouter) -> Self {
        Self {
            method,
            path: path.into(),
            handler,
        }
    }
}

/// A registration closure returned by [`HttpServiceProvider::gateway_setup`]:
/// given the gateway's router and the internal client connection, mounts
/// this service's REST routes and returns the extended router.
pub type GatewayRegisterFn =
    Box<dyn Fn(axum::Router, Arc<ConnectClient>) -> axum::Router + Send + Sync>;

/// Optional capability a [`crate::server::ServiceProvider`] can implement
/// alongside its required RPC registration, to also expose REST routes on
/// the gateway. Modeled as a separate trait (rather than an `Any`-based
/// downcast) so a service opts in by implementing it and exposing itself
/// through `ServiceProvider::as_http_service_provider`.
pub trait HttpServiceProvider: Send + Sync {
    fn gateway_setup(&self) -> Option<GatewayRegisterFn>;
}

/// Runs the configured pre-dispatch interceptor chain ahead of the mux.
#[derive(Clone)]
pub struct PreDispatchLayer {
    interceptors: Arc<Vec<BoxPreDispatchInterceptor>>,
}

impl PreDispatchLayer {
    pub fn new(interceptors: Vec<BoxPreDispatchInterceptor>) -> Self {
        Self {
            interceptors: Arc::new(interceptors),
        }
    }
}

impl<S> Layer<S> for PreDispatchLayer {
    type Service = PreDispatchService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PreDispatchService {
            inner,
            interceptors: self.interceptors.clone(),
        }
    }
}

#[derive(Clone)]
pub struct PreDispatchService<S> {
    inner: S,
    interceptors: Arc<Vec<BoxPreDispatchInterceptor>>,
}

impl<S> Service<Request<Body>> for PreDispatchService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Error: Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let inner = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, inner);
        let interceptors = self.interceptors.clone();

        Box::pin(async move {
            let mut request = req;
            for interceptor in interceptors.iter() {
                match interceptor.intercept(request).await {
                    Ok(next) => request = next,
                    Err(response) => return Ok(response),
                }
            }
            inner.call(request).await
        })
    }
}

/// Applies a [`ResponseMutator`] to every response the inner service
/// produces.
#[derive(Clone)]
pub struct ResponseMutatorLayer {
    mutator: Arc<dyn ResponseMutator>,
}

impl ResponseMutatorLayer {
    pub fn new(mutator: Arc<dyn ResponseMutator>) -> Self {
        Self { mutator }
    }
}

impl<S> Layer<S> for ResponseMutatorLayer {
    type Service = ResponseMutatorService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ResponseMutatorService {
            inner,
            mutator: self.mutator.clone(),
        }
    }
}

#[derive(Clone)]
pub struct ResponseMutatorService<S> {
    inner: S,
    mutator: Arc<dyn ResponseMutator>,
}

impl<S> Service<Request<Body>> for ResponseMutatorService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Error: Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let inner = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, inner);
        let mutator = self.mutator.clone();

        Box::pin(async move {
            let response = inner.call(req).await?;
            Ok(mutator.mutate(response))
        })
    }
}

/// Content-negotiates the response body against the gateway's registered
/// [`Marshaler`] table and strips hop-by-hop response headers (RFC 7230
/// §6.1) before the response leaves the gateway.
///
/// Selection: the first MIME type in the request's `Accept` header that
/// matches a registered marshaler other than plain `application/json` wins;
/// everything else (no match, no `Accept` header, or `Accept: application/json`)
/// passes the response body through unmodified, since the mux's own handlers
/// already emit `application/json`.
#[derive(Clone)]
pub struct MarshalLayer {
    marshalers: Arc<HashMap<Mime, Arc<dyn Marshaler>>>,
}

impl MarshalLayer {
    pub fn new(marshalers: HashMap<Mime, Arc<dyn Marshaler>>) -> Self {
        Self {
            marshalers: Arc::new(marshalers),
        }
    }
}

impl<S> Layer<S> for MarshalLayer {
    type Service = MarshalService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MarshalService {
            inner,
            marshalers: self.marshalers.clone(),
        }
    }
}

#[derive(Clone)]
pub struct MarshalService<S> {
    inner: S,
    marshalers: Arc<HashMap<Mime, Arc<dyn Marshaler>>>,
}

impl<S> Service<Request<Body>> for MarshalService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Error: Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let inner = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, inner);
        let marshalers = self.marshalers.clone();

        let accept = req
            .headers()
            .get(axum::http::header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .and_then(|accept| negotiate(accept, &marshalers));

        Box::pin(async move {
            let response = inner.call(req).await?;
            let (mut parts, body) = response.into_parts();

            *parts.headers_mut() = filter_hop_by_hop(&parts.headers);

            if let Some((mime, marshaler)) = accept {
                let Ok(bytes) = http_body_util::BodyExt::collect(body).await else {
                    return Ok(Response::from_parts(parts, Body::empty()));
                };
                let bytes = bytes.to_bytes();
                let remarshaled = serde_json::from_slice(&bytes)
                    .ok()
                    .and_then(|value| marshaler.marshal(&value).ok());
                match remarshaled {
                    Some(out) => {
                        parts.headers.insert(
                            axum::http::header::CONTENT_TYPE,
                            HeaderValue::from_str(mime.as_ref())
                                .unwrap_or_else(|_| HeaderValue::from_static("application/json")),
                        );
                        Ok(Response::from_parts(parts, Body::from(out)))
                    }
                    // Not JSON (e.g. an already-marshaled error body) -- pass through.
                    None => Ok(Response::from_parts(parts, Body::from(bytes))),
                }
            } else {
                Ok(Response::from_parts(parts, body))
            }
        })
    }
}

/// Picks the first `Accept` candidate that names a non-default registered
/// marshaler.
fn negotiate(
    accept: &str,
    marshalers: &HashMap<Mime, Arc<dyn Marshaler>>,
) -> Option<(Mime, Arc<dyn Marshaler>)> {
    for candidate in accept.split(',') {
        let candidate = candidate.split(';').next().unwrap_or("").trim();
        if candidate.is_empty() || candidate == mime::APPLICATION_JSON.as_ref() {
            continue;
        }
        if let Ok(parsed) = candidate.parse::<Mime>() {
            if let Some(marshaler) = marshalers.get(&parsed) {
                return Some((parsed, marshaler.clone()));
            }
        }
    }
    None
}
