//! Response types for Connect RPC client calls.
//!
//! This module provides:
//! - [`ConnectResponse`]: Response wrapper carrying a message (or stream) plus metadata
//! - [`Metadata`]: A cheap wrapper around response headers

use http::HeaderMap;

/// Response headers returned by the server.
///
/// Wraps [`http::HeaderMap`] so callers don't need to depend on `http`
/// directly just to read a response's metadata.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    headers: HeaderMap,
}

impl Metadata {
    /// Wrap a header map.
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }

    /// Get a single header value by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Access the underlying header map.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Consume the wrapper, returning the underlying header map.
    pub fn into_headers(self) -> HeaderMap {
        self.headers
    }
}

/// Wraps an RPC response value together with the headers the server sent
/// alongside it.
///
/// For unary calls `T` is the decoded response message; for streaming calls
/// it's a [`Streaming`](crate::Streaming) handle over the message stream.
#[derive(Debug, Clone)]
pub struct ConnectResponse<T> {
    message: T,
    metadata: Metadata,
}

impl<T> ConnectResponse<T> {
    /// Wrap a response value with its metadata.
    pub fn new(message: T, metadata: Metadata) -> Self {
        Self { message, metadata }
    }

    /// Consume the response, discarding metadata.
    pub fn into_inner(self) -> T {
        self.message
    }

    /// Split into the response value and its metadata.
    pub fn into_parts(self) -> (T, Metadata) {
        (self.message, self.metadata)
    }

    /// Borrow the response value.
    pub fn get_ref(&self) -> &T {
        &self.message
    }

    /// Response headers sent by the server.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_roundtrips_header_value() {
        let mut headers = HeaderMap::new();
        headers.insert("x-trace-id", "abc".parse().unwrap());
        let metadata = Metadata::new(headers);
        assert_eq!(metadata.get("x-trace-id"), Some("abc"));
        assert_eq!(metadata.get("missing"), None);
    }

    #[test]
    fn connect_response_into_parts() {
        let response = ConnectResponse::new(42u32, Metadata::default());
        let (value, _metadata) = response.into_parts();
        assert_eq!(value, 42);
    }
}
