//! Token authentication/authorization.
//!
//! [`AuthLayer`] runs a single [`TokenValidator`] against the request
//! metadata, turning it into a `Metadata` it inserts back into extensions for
//! downstream handlers. A per-service override (an
//! [`AuthFuncOverride`]-style extension, checked before the default
//! validator) lets individual services replace the server-wide validator
//! without rebuilding the whole chain.

use std::sync::Arc;
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use axum::http::Request;
use axum::response::Response;
use tower::{Layer, Service, ServiceExt};

use crate::context::ConnectContext;
use crate::message::error::{Code, ConnectError};
use crate::metadata::Metadata;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    PermissionDenied(String),
}

impl AuthError {
    fn into_connect_error(self) -> ConnectError {
        match self {
            AuthError::Unauthenticated(msg) => ConnectError::new(Code::Unauthenticated, msg),
            AuthError::PermissionDenied(msg) => ConnectError::new(Code::PermissionDenied, msg),
        }
    }
}

/// Validates request metadata and returns (possibly augmented) metadata to
/// carry forward, or rejects the call.
#[async_trait::async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate(&self, metadata: &Metadata) -> Result<Metadata, AuthError>;
}

/// A per-service override for the server-wide [`TokenValidator`]. Services
/// that need a different auth policy insert one of these into the request
/// extensions (typically from an Axum route extension layer); [`AuthLayer`]
/// checks it before falling back to its configured default.
#[derive(Clone)]
pub struct AuthFuncOverride(pub Arc<dyn TokenValidator>);

/// Runs token authentication ahead of the wrapped service, rejecting the
/// call with `Unauthenticated`/`PermissionDenied` before it ever reaches the
/// handler.
#[derive(Clone)]
pub struct AuthLayer {
    default_validator: Arc<dyn TokenValidator>,
}

impl AuthLayer {
    pub fn new(default_validator: Arc<dyn TokenValidator>) -> Self {
        Self { default_validator }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            default_validator: self.default_validator.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthService<S> {
    inner: S,
    default_validator: Arc<dyn TokenValidator>,
}

impl<S, ReqBody> Service<Request<ReqBody>> for AuthService<S>
where
    S: Service<Request<ReqBody>, Response = Response> + Clone + Send + 'static,
    S::Error: Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let protocol = req
            .extensions()
            .get::<ConnectContext>()
            .map(|ctx| ctx.protocol)
            .unwrap_or_default();

        // Bug fix: both unary and streaming paths must check the per-service
        // override first and only fall back to the default validator when no
        // override is installed. An earlier revision checked the default
        // first, silently ignoring any override.
        let validator = req
            .extensions()
            .get::<AuthFuncOverride>()
            .map(|o| o.0.clone())
            .unwrap_or_else(|| self.default_validator.clone());

        let inner = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, inner);

        Box::pin(async move {
            let incoming = Metadata::from_headers(req.headers().clone());
            match validator.validate(&incoming).await {
                Ok(validated) => {
                    let mut req = req;
                    req.extensions_mut().insert(validated);
                    inner.oneshot(req).await
                }
                Err(err) => Ok(err.into_connect_error().into_response_with_protocol(protocol)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{HeaderValue, StatusCode};
    use tower::ServiceExt as _;

    struct AllowAll;

    #[async_trait::async_trait]
    impl TokenValidator for AllowAll {
        async fn validate(&self, metadata: &Metadata) -> Result<Metadata, AuthError> {
            Ok(metadata.clone())
        }
    }

    struct DenyAll;

    #[async_trait::async_trait]
    impl TokenValidator for DenyAll {
        async fn validate(&self, _metadata: &Metadata) -> Result<Metadata, AuthError> {
            Err(AuthError::Unauthenticated("no token".into()))
        }
    }

    #[derive(Clone)]
    struct Echo;

    impl Service<Request<Body>> for Echo {
        type Response = Response;
        type Error = std::convert::Infallible;
        type Future = Pin<Box<dyn Future<Output = Result<Response, Self::Error>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: Request<Body>) -> Self::Future {
            Box::pin(async { Ok(Response::new(Body::empty())) })
        }
    }

    #[tokio::test]
    async fn default_validator_rejects() {
        let svc = AuthLayer::new(Arc::new(DenyAll)).layer(Echo);
        let req = Request::builder().body(Body::empty()).unwrap();
        let response = svc.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn override_wins_over_default() {
        let svc = AuthLayer::new(Arc::new(DenyAll)).layer(Echo);
        let mut req = Request::builder().body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(AuthFuncOverride(Arc::new(AllowAll)));
        let response = svc.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn default_validator_allows() {
        let svc = AuthLayer::new(Arc::new(AllowAll)).layer(Echo);
        let mut req = Request::builder().body(Body::empty()).unwrap();
        req.headers_mut()
            .insert("authorization", HeaderValue::from_static("Bearer tok"));
        let response = svc.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
