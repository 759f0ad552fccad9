//! Structured tracing around every call.
//!
//! [`ObservabilityLayer`] opens a `tracing::Span` named `<service>/<method>`
//! (derived from the request path) around each call, records request/response
//! message sizes and the resulting status code, and escalates the span's
//! level to `ERROR` for a fixed set of codes that indicate a server-side
//! problem rather than a normal client-facing rejection.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use axum::http::{HeaderMap, Request};
use axum::response::Response;
use tower::{Layer, Service};
use tracing::Level;

use crate::message::error::Code;

/// Codes that represent a server-side failure and are logged at `ERROR`
/// rather than `INFO`. Everything else (e.g. `NotFound`, `InvalidArgument`)
/// is a normal, expected outcome of a well-formed call.
const ERROR_LEVEL_CODES: &[Code] = &[
    Code::Unknown,
    Code::DeadlineExceeded,
    Code::Unimplemented,
    Code::Internal,
    Code::Unavailable,
    Code::DataLoss,
];

#[derive(Debug, Clone, Copy, Default)]
pub struct ObservabilityLayer;

impl ObservabilityLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for ObservabilityLayer {
    type Service = ObservabilityService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ObservabilityService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct ObservabilityService<S> {
    inner: S,
}

impl<S, ReqBody> Service<Request<ReqBody>> for ObservabilityService<S>
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
        let (service, method) = split_method(req.uri().path());
        let peer = peer_address(req.headers());
        let request_size = req
            .headers()
            .get(axum::http::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let span = tracing::info_span!(
            "rpc.call",
            "rpc.system" = "connect",
            "rpc.service" = %service,
            "rpc.method" = %method,
            "rpc.peer" = %peer.unwrap_or_else(|| "unknown".to_string()),
            "rpc.request.size" = request_size,
            "rpc.response.size" = tracing::field::Empty,
            "rpc.status_code" = tracing::field::Empty,
        );

        let inner = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, inner);

        let fut = {
            let _entered = span.enter();
            inner.call(req)
        };

        Box::pin(async move {
            let response = fut.await;

            if let Ok(response) = &response {
                let _entered = span.enter();
                let status = status_from_response(response);
                span.record("rpc.status_code", tracing::field::display(status.as_str()));
                let response_size = response
                    .headers()
                    .get(axum::http::header::CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok());
                span.record("rpc.response.size", response_size);

                if ERROR_LEVEL_CODES.contains(&status) {
                    tracing::event!(Level::ERROR, "rpc call completed with server-side error");
                } else {
                    tracing::event!(Level::INFO, "rpc call completed");
                }
            }

            response
        })
    }
}

fn split_method(path: &str) -> (String, String) {
    let trimmed = path.trim_start_matches('/');
    match trimmed.rsplit_once('/') {
        Some((service, method)) => (service.to_string(), method.to_string()),
        None => (String::new(), trimmed.to_string()),
    }
}

/// Prefers `x-forwarded-for`/`x-real-ip` (leftmost entry) over the raw
/// connection peer, since this framework is typically deployed behind a
/// reverse proxy.
fn peer_address(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = value.split(',').next() {
            return Some(first.trim().to_string());
        }
    }
    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

pub(crate) fn status_from_response(response: &Response) -> Code {
    response
        .headers()
        .get("grpc-status")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i32>().ok())
        .and_then(code_from_i32)
        .unwrap_or(if response.status().is_success() {
            Code::Ok
        } else {
            crate::message::error::code_from_status(response.status())
        })
}

fn code_from_i32(value: i32) -> Option<Code> {
    Some(match value {
        0 => Code::Ok,
        1 => Code::Canceled,
        2 => Code::Unknown,
        3 => Code::InvalidArgument,
        4 => Code::DeadlineExceeded,
        5 => Code::NotFound,
        6 => Code::AlreadyExists,
        7 => Code::PermissionDenied,
        8 => Code::ResourceExhausted,
        9 => Code::FailedPrecondition,
        10 => Code::Aborted,
        11 => Code::OutOfRange,
        12 => Code::Unimplemented,
        13 => Code::Internal,
        14 => Code::Unavailable,
        15 => Code::DataLoss,
        16 => Code::Unauthenticated,
        _ => return None,
    })
}
