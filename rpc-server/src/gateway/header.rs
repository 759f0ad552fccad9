//! Hop-by-hop header filtering for the REST-to-RPC boundary.

use axum::http::{HeaderMap, HeaderName, HeaderValue};

/// Headers that must not cross the HTTP/1-to-RPC boundary (RFC 7230 §6.1).
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
];

/// Copies every header from `source` into a fresh map except the hop-by-hop
/// set, trimming trailing CR/LF from each value first.
pub fn filter_hop_by_hop(source: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(source.len());
    for (name, value) in source.iter() {
        if is_hop_by_hop(name) {
            continue;
        }
        if let Ok(trimmed) = trim_value(value) {
            out.append(name.clone(), trimmed);
        }
    }
    out
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

fn trim_value(value: &HeaderValue) -> Result<HeaderValue, axum::http::header::InvalidHeaderValue> {
    let text = value.to_str().unwrap_or_default();
    HeaderValue::from_str(text.trim_end_matches(['\r', '\n']))
}
