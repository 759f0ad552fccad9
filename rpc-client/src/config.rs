//! Configuration modules for Connect RPC client.
//!
//! This module contains request-level configuration:
//! - [`CallOptions`]: Per-call timeout and headers
//! - [`RetryPolicy`]: Retry behavior with exponential backoff
//! - [`Interceptor`]/[`InterceptorChain`]: Request/response interception

pub mod interceptor;
pub mod retry;

pub use interceptor::{
    HeaderInterceptor, Interceptor, InterceptorChain, StreamType, StreamingRequest, UnaryFunc,
    UnaryRequest,
};
pub use retry::{ExponentialBackoff, RetryExt, RetryPolicy, defaults, retry, retry_with_policy};
pub use crate::options::{CallOptions, duration_to_timeout_header};
