//! Recovers panics in downstream handlers into an `Internal` error response
//! instead of tearing down the connection.

use std::panic::AssertUnwindSafe;
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use axum::http::Request;
use axum::response::Response;
use futures::FutureExt;
use tower::{Layer, Service};

use crate::context::RequestProtocol;
use crate::message::error::{Code, ConnectError};

/// Wraps a service so a panic inside it is converted into an `Internal`
/// Connect/gRPC error response rather than aborting the task.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanicRecoveryLayer;

impl PanicRecoveryLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for PanicRecoveryLayer {
    type Service = PanicRecoveryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PanicRecoveryService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct PanicRecoveryService<S> {
    inner: S,
}

impl<S, ReqBody> Service<Request<ReqBody>> for PanicRecoveryService<S>
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
            .get::<crate::context::ConnectContext>()
            .map(|ctx| ctx.protocol)
            .unwrap_or_default();

        let inner = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, inner);

        Box::pin(async move {
            let result = AssertUnwindSafe(inner.call(req)).catch_unwind().await;
            match result {
                Ok(response) => response,
                Err(panic) => {
                    let message = panic_message(&panic);
                    tracing::error!(target: "rpc_server", message, "handler panicked");
                    Ok(internal_error(protocol, message))
                }
            }
        })
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}

fn internal_error(protocol: RequestProtocol, message: &str) -> Response {
    ConnectError::new(Code::Internal, message).into_response_with_protocol(protocol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    #[derive(Clone)]
    struct PanickingService;

    impl Service<Request<Body>> for PanickingService {
        type Response = Response;
        type Error = std::convert::Infallible;
        type Future = Pin<Box<dyn Future<Output = Result<Response, Self::Error>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: Request<Body>) -> Self::Future {
            Box::pin(async { panic!("boom") })
        }
    }

    #[tokio::test]
    async fn panic_is_converted_to_internal_error() {
        let svc = PanicRecoveryLayer::new().layer(PanickingService);
        let req = Request::builder().body(Body::empty()).unwrap();
        let response = svc.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn panic_message_is_surfaced_in_the_response_body() {
        let svc = PanicRecoveryLayer::new().layer(PanickingService);
        let req = Request::builder().body(Body::empty()).unwrap();
        let response = svc.oneshot(req).await.unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("boom"), "response body should contain the panic message: {text}");
    }
}
