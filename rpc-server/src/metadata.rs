//! Protocol-neutral request metadata.
//!
//! [`Metadata`] is the case-insensitive, multi-valued key/value map carried
//! alongside every call, independent of whether the call arrived over gRPC
//! (Tonic metadata) or Connect (HTTP headers). Both are backed by
//! [`http::HeaderMap`] under the hood, so this is a thin, protocol-neutral
//! wrapper rather than a reimplementation.

use http::{HeaderMap, HeaderName, HeaderValue};

use crate::message::error::{Code, ConnectError};

/// Case-insensitive, multi-valued metadata attached to a request or response.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    headers: HeaderMap,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_headers(headers: HeaderMap) -> Self {
        Self { headers }
    }

    pub fn into_headers(self) -> HeaderMap {
        self.headers
    }

    /// First value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|v| v.to_str().ok())
    }

    /// All values for `key`, in insertion order.
    pub fn get_all(&self, key: &str) -> impl Iterator<Item = &str> {
        self.headers.get_all(key).iter().filter_map(|v| v.to_str().ok())
    }

    /// Append a value, trimming surrounding whitespace first.
    ///
    /// Multiple calls with the same key append rather than replace, matching
    /// `HeaderMap::append` semantics for repeated headers.
    pub fn insert(&mut self, key: &str, value: impl AsRef<str>) -> Result<(), MetadataError> {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| MetadataError::InvalidKey(key.to_string()))?;
        let trimmed = value.as_ref().trim();
        let value = HeaderValue::from_str(trimmed)
            .map_err(|_| MetadataError::InvalidValue(trimmed.to_string()))?;
        self.headers.append(name, value);
        Ok(())
    }

    /// Merge `other` into `self`, appending rather than overwriting.
    pub fn merge(&mut self, other: Metadata) {
        for (name, value) in other.headers.into_iter() {
            if let Some(name) = name {
                self.headers.append(name, value);
            }
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("invalid metadata key: {0}")]
    InvalidKey(String),
    #[error("invalid metadata value: {0}")]
    InvalidValue(String),
}

/// Extract a bearer-style auth token from the `authorization` header.
///
/// `scheme` is matched case-insensitively against the leading token (e.g.
/// `"Bearer"`); the remainder, split on the first whitespace run, is
/// returned as the token. Returns `Unauthenticated` if the header is
/// missing, malformed, or uses a different scheme.
pub fn get_auth_token(metadata: &Metadata, scheme: &str) -> Result<String, ConnectError> {
    let raw = metadata.get("authorization").ok_or_else(|| {
        ConnectError::new(Code::Unauthenticated, "missing authorization metadata")
    })?;

    let mut parts = raw.splitn(2, ' ');
    let got_scheme = parts.next().unwrap_or("");
    let token = parts.next().unwrap_or("").trim();

    if !got_scheme.eq_ignore_ascii_case(scheme) {
        return Err(ConnectError::new(
            Code::Unauthenticated,
            format!("expected \"{scheme}\" authorization scheme"),
        ));
    }
    if token.is_empty() {
        return Err(ConnectError::new(
            Code::Unauthenticated,
            "empty authorization token",
        ));
    }

    Ok(token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_trims_and_appends() {
        let mut md = Metadata::new();
        md.insert("x-trace-id", "  abc123  ").unwrap();
        md.insert("x-trace-id", "def456").unwrap();
        let values: Vec<_> = md.get_all("x-trace-id").collect();
        assert_eq!(values, vec!["abc123", "def456"]);
    }

    #[test]
    fn get_is_case_insensitive() {
        let mut md = Metadata::new();
        md.insert("X-Custom", "v").unwrap();
        assert_eq!(md.get("x-custom"), Some("v"));
    }

    #[test]
    fn get_auth_token_happy_path() {
        let mut md = Metadata::new();
        md.insert("authorization", "Bearer mytoken").unwrap();
        assert_eq!(get_auth_token(&md, "Bearer").unwrap(), "mytoken");
    }

    #[test]
    fn get_auth_token_wrong_scheme() {
        let mut md = Metadata::new();
        md.insert("authorization", "Basic abc").unwrap();
        let err = get_auth_token(&md, "Bearer").unwrap_err();
        assert!(matches!(err.code(), Code::Unauthenticated));
    }

    #[test]
    fn get_auth_token_missing_header() {
        let md = Metadata::new();
        let err = get_auth_token(&md, "Bearer").unwrap_err();
        assert!(matches!(err.code(), Code::Unauthenticated));
    }
}
