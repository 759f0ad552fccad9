//! Context error type - unified error handling for request/response processing.

use crate::context::RequestProtocol;
use crate::message::error::{Code, ConnectError};
use axum::response::Response;

/// Context processing error.
///
/// Handles both user-facing Connect errors and internal server errors, and
/// always carries the protocol the response must be encoded with.
#[derive(Debug)]
pub struct ContextError {
    kind: ContextErrorKind,
    protocol: RequestProtocol,
}

#[derive(Debug)]
enum ContextErrorKind {
    /// User-facing error - return directly to client
    Connect(ConnectError),
    /// Internal error - log, return generic internal error to client
    Internal(String),
}

impl ContextError {
    /// Create a user-facing Connect error for the given protocol.
    pub fn new(protocol: RequestProtocol, err: ConnectError) -> Self {
        Self {
            kind: ContextErrorKind::Connect(err),
            protocol,
        }
    }

    /// Create an internal error for the given protocol.
    ///
    /// The message is logged but never sent to the client; the client sees a
    /// generic "internal error" message with code [`Code::Internal`].
    pub fn internal(protocol: RequestProtocol, msg: impl Into<String>) -> Self {
        Self {
            kind: ContextErrorKind::Internal(msg.into()),
            protocol,
        }
    }

    /// Create a user-facing Connect error without a known protocol yet
    /// (e.g. before request context has been built). Defaults to
    /// [`RequestProtocol::Unknown`], matching connect-go's fallback framing.
    pub fn connect(err: ConnectError) -> Self {
        Self::new(RequestProtocol::Unknown, err)
    }

    /// Override the protocol used when rendering this error to a response.
    pub fn with_protocol(mut self, protocol: RequestProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Convert to ConnectError for response.
    ///
    /// Internal errors become generic "internal error" message.
    /// The original error details are not exposed to clients for security.
    pub fn into_connect_error(self) -> ConnectError {
        match self.kind {
            ContextErrorKind::Connect(err) => err,
            ContextErrorKind::Internal(_msg) => {
                // Internal error details not exposed to clients. Callers
                // should log the ContextError before conversion if needed.
                ConnectError::new(Code::Internal, "internal error")
            }
        }
    }

    /// Convert to an HTTP response encoded for this error's protocol.
    pub fn into_response(self) -> Response {
        let protocol = self.protocol;
        self.into_connect_error()
            .into_response_with_protocol(protocol)
    }
}

impl From<ConnectError> for ContextError {
    fn from(err: ConnectError) -> Self {
        Self::connect(err)
    }
}

impl std::fmt::Display for ContextError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ContextErrorKind::Connect(err) => {
                write!(f, "{}", err.message().unwrap_or("connect error"))
            }
            ContextErrorKind::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for ContextError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_error_from_connect_error() {
        let err = ConnectError::new(Code::InvalidArgument, "test error");
        let ctx_err: ContextError = err.into();
        let connect_err = ctx_err.into_connect_error();
        assert!(matches!(connect_err.code(), Code::InvalidArgument));
    }

    #[test]
    fn test_context_error_internal() {
        let err = ContextError::internal(RequestProtocol::Unknown, "something went wrong");
        assert_eq!(format!("{err}"), "internal error: something went wrong");
    }

    #[test]
    fn test_context_error_into_connect_error() {
        let err = ContextError::new(
            RequestProtocol::ConnectUnaryJson,
            ConnectError::new(Code::NotFound, "not found"),
        );
        let connect_err = err.into_connect_error();
        assert!(matches!(connect_err.code(), Code::NotFound));

        let err = ContextError::internal(RequestProtocol::ConnectUnaryJson, "secret details");
        let connect_err = err.into_connect_error();
        assert!(matches!(connect_err.code(), Code::Internal));
        assert_eq!(connect_err.message(), Some("internal error"));
    }

    #[test]
    fn test_with_protocol() {
        let err = ContextError::connect(ConnectError::new(Code::NotFound, "not found"))
            .with_protocol(RequestProtocol::ConnectUnaryJson);
        let _response = err.into_response();
    }
}
