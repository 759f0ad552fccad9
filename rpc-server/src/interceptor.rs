//! Composable request interceptors, built as Tower `Layer`/`Service` pairs.
//!
//! Each interceptor follows the same shape as [`crate::layer::ConnectLayer`]:
//! a `Layer` holding static configuration, wrapping a `Service` that reads
//! per-request state from extensions (most often the
//! [`ConnectContext`](crate::context::ConnectContext) `ConnectLayer` already
//! inserted) and either calls through to the inner service or short-circuits
//! with an error response.
//!
//! [`crate::server::build_chain`] assembles the fixed ordering these
//! interceptors run in.

pub mod auth;
pub mod observability;
pub mod panic_recovery;
pub mod rate_limit;
pub mod validation;

#[cfg(feature = "metrics")]
pub mod prometheus;

pub use auth::{AuthError, AuthFuncOverride, AuthLayer, TokenValidator};
pub use observability::ObservabilityLayer;
pub use panic_recovery::PanicRecoveryLayer;
pub use rate_limit::RateLimitLayer;
pub use validation::{Validatable, validate_or_reject};

#[cfg(feature = "metrics")]
pub use prometheus::PrometheusLayer;
