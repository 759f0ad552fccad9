//! Per-method Prometheus counters and histograms, behind the `metrics`
//! feature.
//!
//! [`PrometheusLayer`] increments a request counter and records a latency
//! histogram for every call, labeled by `service`/`method`/`code`. Call
//! [`PrometheusLayer::register_known_methods`] once at startup so every
//! known method shows up in scrapes with a zero sample before its first
//! call, rather than only appearing after first use.

use std::time::Instant;
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use axum::http::Request;
use axum::response::Response;
use metrics::{counter, histogram};
use tower::{Layer, Service};

#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusLayer;

impl PrometheusLayer {
    pub fn new() -> Self {
        Self
    }

    /// Pre-register a zero sample for every known `service/method` pair so
    /// it appears in scrapes immediately, instead of only after first use.
    pub fn register_known_methods(methods: &[(&str, &str)]) {
        for (service, method) in methods {
            counter!("rpc_requests_total", "service" => service.to_string(), "method" => method.to_string(), "code" => "ok").absolute(0);
        }
    }
}

impl<S> Layer<S> for PrometheusLayer {
    type Service = PrometheusService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PrometheusService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct PrometheusService<S> {
    inner: S,
}

impl<S, ReqBody> Service<Request<ReqBody>> for PrometheusService<S>
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

        let inner = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, inner);
        let start = Instant::now();

        Box::pin(async move {
            let response = inner.call(req).await;
            let elapsed = start.elapsed();

            if let Ok(response) = &response {
                let code = super::observability::status_from_response(response)
                    .as_str()
                    .to_string();
                counter!(
                    "rpc_requests_total",
                    "service" => service.clone(),
                    "method" => method.clone(),
                    "code" => code.clone(),
                )
                .increment(1);
                histogram!(
                    "rpc_request_duration_seconds",
                    "service" => service,
                    "method" => method,
                    "code" => code,
                )
                .record(elapsed.as_secs_f64());
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
