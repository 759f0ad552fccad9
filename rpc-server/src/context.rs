//! Common types for Connect RPC request handling.
//!
//! This module provides types used by both the [`ConnectLayer`] middleware
//! and request extensions, including protocol detection, timeout configuration,
//! and message size limits.
//!
//! [`ConnectLayer`]: crate::layer::ConnectLayer

pub mod config;
pub mod error;
pub mod limit;
pub mod protocol;
pub mod timeout;

pub use config::ProtocolConfig;
pub use error::ContextError;
pub use limit::MessageLimits;
pub use protocol::{RequestProtocol, detect_protocol};
pub use rpc_core::{CompressionConfig, CompressionEncoding};
pub use timeout::ConnectTimeout;

use axum::http::HeaderMap;

/// Per-message compression encodings negotiated for a streaming call.
///
/// Connect's envelope framing compresses each message independently, so the
/// request and response directions are negotiated separately: the request
/// side is whatever the client actually sent (`Connect-Content-Encoding`),
/// the response side is the richest encoding the client declared it accepts
/// (`Connect-Accept-Encoding`) that the server also supports.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopeCompression {
    pub request: CompressionEncoding,
    pub response: CompressionEncoding,
}

/// Compression settings attached to a [`ConnectContext`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectCompression {
    /// Threshold/level settings shared by unary and streaming compression.
    pub config: CompressionConfig,
    /// Per-envelope encodings, set only for streaming requests.
    pub envelope: Option<EnvelopeCompression>,
}

/// Per-request state threaded through decoding, handling, and encoding.
///
/// Built once by [`ConnectLayer`](crate::layer::ConnectLayer) and stored in
/// request extensions; handlers and the `ConnectRequest`/`ConnectResponse`
/// extractors read it from there rather than re-deriving it.
#[derive(Debug, Clone, Copy)]
pub struct ConnectContext {
    pub protocol: RequestProtocol,
    pub limits: MessageLimits,
    pub compression: ConnectCompression,
    /// Whether decoded messages implementing `Validatable` are checked
    /// after extraction. See [`crate::interceptor::validation`].
    pub input_validation: bool,
}

impl Default for ConnectContext {
    fn default() -> Self {
        Self {
            protocol: RequestProtocol::default(),
            limits: MessageLimits::default(),
            compression: ConnectCompression::default(),
            input_validation: true,
        }
    }
}

/// Parse per-envelope compression from request headers for a streaming call.
///
/// Returns `None` for unary protocols, where Tower's compression layers
/// handle the HTTP body instead of per-message envelopes.
pub fn envelope_compression_from_headers(
    protocol: RequestProtocol,
    headers: &HeaderMap,
    config: CompressionConfig,
) -> Option<EnvelopeCompression> {
    if !protocol.is_streaming() {
        return None;
    }

    let request = headers
        .get("connect-content-encoding")
        .and_then(|v| v.to_str().ok())
        .and_then(CompressionEncoding::from_header)
        .unwrap_or_default();

    let response = headers
        .get("connect-accept-encoding")
        .and_then(|v| v.to_str().ok())
        .map(|accept| negotiate_response_encoding(accept, config))
        .unwrap_or_default();

    Some(EnvelopeCompression { request, response })
}

/// Pick the response envelope encoding from a client's `Connect-Accept-Encoding`
/// list, preferring the first listed encoding the server also supports.
fn negotiate_response_encoding(accept: &str, config: CompressionConfig) -> CompressionEncoding {
    if config.is_disabled() {
        return CompressionEncoding::Identity;
    }

    for candidate in accept.split(',') {
        if let Some(encoding) = CompressionEncoding::from_header(Some(candidate.trim())) {
            if !encoding.is_identity() {
                return encoding;
            }
        }
    }
    CompressionEncoding::Identity
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn envelope_compression_none_for_unary() {
        let headers = HeaderMap::new();
        assert!(
            envelope_compression_from_headers(
                RequestProtocol::ConnectUnaryJson,
                &headers,
                CompressionConfig::default(),
            )
            .is_none()
        );
    }

    #[test]
    fn envelope_compression_defaults_to_identity() {
        let headers = HeaderMap::new();
        let compression = envelope_compression_from_headers(
            RequestProtocol::ConnectStreamJson,
            &headers,
            CompressionConfig::default(),
        )
        .unwrap();
        assert_eq!(compression.request, CompressionEncoding::Identity);
        assert_eq!(compression.response, CompressionEncoding::Identity);
    }

    #[test]
    fn envelope_compression_disabled_config_forces_identity() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "connect-accept-encoding",
            HeaderValue::from_static("gzip"),
        );
        let compression = envelope_compression_from_headers(
            RequestProtocol::ConnectStreamJson,
            &headers,
            CompressionConfig::disabled(),
        )
        .unwrap();
        assert_eq!(compression.response, CompressionEncoding::Identity);
    }
}
