//! Timeout parsing and computation for the Connect layer.

use crate::context::ConnectTimeout;
use axum::http::Request;
use std::time::Duration;

/// Header name for Connect timeout in milliseconds.
pub const CONNECT_TIMEOUT_MS_HEADER: &str = "connect-timeout-ms";

/// Parse the Connect-Timeout-Ms header from a request.
///
/// Returns a `ConnectTimeout` with the parsed duration, or a default (no timeout)
/// if the header is missing or invalid.
pub fn parse_timeout<B>(req: &Request<B>) -> ConnectTimeout {
    req.headers()
        .get(CONNECT_TIMEOUT_MS_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(ConnectTimeout::parse)
        .unwrap_or_default()
}

/// Compute the effective timeout from server and client timeouts.
///
/// The effective timeout is the minimum of the two, matching Connect-Go's behavior
/// where the smaller timeout always wins.
pub fn compute_effective_timeout(
    server_timeout: Option<Duration>,
    client_timeout: ConnectTimeout,
) -> ConnectTimeout {
    match (server_timeout, client_timeout.duration()) {
        // Both set: use the smaller
        (Some(server), Some(client)) => ConnectTimeout::new(server.min(client)),
        // Only server set
        (Some(server), None) => ConnectTimeout::new(server),
        // Only client set (or neither)
        (None, _) => client_timeout,
    }
}
