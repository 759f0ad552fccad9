//! Per-process request rate limiting.
//!
//! [`RateLimitLayer`] wraps a [`governor`] token-bucket limiter and rejects
//! calls ahead of dispatch with `ResourceExhausted`, never invoking the
//! inner service when the bucket is empty.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use axum::http::Request;
use axum::response::Response;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use tower::{Layer, Service, ServiceExt};

use crate::context::ConnectContext;
use crate::message::error::{Code, ConnectError};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rejects calls once the configured requests-per-second budget is
/// exhausted. Burst capacity is clamped to `max(1, requests_per_second / 5)`
/// -- a tight burst window keeps a misconfigured `rps` of e.g. 1 from making
/// the bucket permanently empty.
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<DirectRateLimiter>,
}

impl RateLimitLayer {
    /// `requests_per_second = 0` disables limiting (the layer becomes a
    /// passthrough at the service level -- construction still requires a
    /// valid nonzero quota, so callers should avoid inserting this layer at
    /// all when rate limiting is configured off, per `build_chain`).
    pub fn new(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second.max(1)).unwrap();
        let burst = NonZeroU32::new((requests_per_second / 5).max(1)).unwrap();
        let quota = Quota::per_second(rps).allow_burst(burst);
        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<DirectRateLimiter>,
}

impl<S, ReqBody> Service<Request<ReqBody>> for RateLimitService<S>
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

        if self.limiter.check().is_err() {
            let err = ConnectError::new(Code::ResourceExhausted, "rate limit exceeded");
            return Box::pin(async move { Ok(err.into_response_with_protocol(protocol)) });
        }

        let inner = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, inner);

        Box::pin(async move { inner.oneshot(req).await })
    }
}
