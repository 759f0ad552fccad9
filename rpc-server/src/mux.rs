//! The connection multiplexer: one listener, two protocols.
//!
//! [`classify`] peeks an accepted connection's first bytes -- never
//! consuming them, via `TcpStream::peek`/`UnixStream::peek` -- and compares
//! them against the HTTP/2 client connection preface (RFC 9113 §3.4) before
//! any HTTP framing begins. Each accept loop in `server::lifecycle` uses the
//! result to drive the connection with one of two separately configured
//! `hyper_util` server builders: `.http2_only()` for [`Protocol::Rpc`], the
//! default h1/h2-auto builder otherwise. That is the "two independently
//! driven serve loops" the spec's connection multiplexer calls for --
//! implemented as two branches of one accept loop rather than two separate
//! `tokio::net::TcpListener`s, since there is only one OS listener per bind
//! target and the two branches never contend with each other (each
//! connection's classify-then-serve runs in its own spawned task).
//!
//! This only applies to plaintext connections. A TLS-terminated connection
//! has already negotiated ALPN down to `h2` by the time decrypted
//! application bytes exist to peek (`rustls` only ever offers `h2`, see
//! `net::tls::DEFAULT_ALPN_PROTOCOLS`), so every TLS connection is treated
//! as [`Protocol::Rpc`] without running the classifier at all.
//!
//! [`ProtocolMux`] (re-exported from [`crate::tonic::ContentTypeSwitch`]) is
//! a different, unrelated piece of plumbing: a per-*request* `Content-Type`
//! dispatcher that picks between the gRPC service and the Connect/REST
//! router for calls arriving on the already-classified RPC branch. It runs
//! one layer up from [`classify`], after HTTP framing, not instead of it.

use std::io;
use std::time::Duration;

pub use crate::tonic::ContentTypeSwitch as ProtocolMux;

/// The HTTP/2 client connection preface every HTTP/2 prior-knowledge client
/// sends before its first frame (RFC 9113 §3.4).
pub const HTTP2_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// How long [`classify`] waits for a full preface-length peek before giving
/// up and classifying the connection as [`Protocol::Http1`].
pub const CLASSIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// How long [`classify`] sleeps between peeks when fewer than
/// [`HTTP2_PREFACE`]'s length bytes are currently buffered. `peek` (like
/// `recv` with `MSG_PEEK`) returns immediately with whatever is already
/// available rather than waiting for the full buffer to fill, so this loop
/// polls instead of busy-spinning on a partial read.
const PEEK_RETRY_DELAY: Duration = Duration::from_millis(5);

/// Which half of the multiplexer an accepted, not-yet-framed connection
/// belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// HTTP/2 prior knowledge -- served `.http2_only()`.
    Rpc,
    /// Everything else -- served by the default h1/h2-auto builder.
    Http1,
}

/// A raw accepted stream [`classify`] can peek without consuming.
#[async_trait::async_trait]
pub trait Peekable: Send + Sync {
    async fn peek(&self, buf: &mut [u8]) -> io::Result<usize>;
}

#[async_trait::async_trait]
impl Peekable for tokio::net::TcpStream {
    async fn peek(&self, buf: &mut [u8]) -> io::Result<usize> {
        tokio::net::TcpStream::peek(self, buf).await
    }
}

#[async_trait::async_trait]
impl Peekable for tokio::net::UnixStream {
    async fn peek(&self, buf: &mut [u8]) -> io::Result<usize> {
        tokio::net::UnixStream::peek(self, buf).await
    }
}

/// Classifies `stream` by peeking its first bytes. Falls back to
/// [`Protocol::Http1`] on a peek error or after [`CLASSIFY_TIMEOUT`] --
/// either way the connection is still handed to a real HTTP server, which
/// rejects garbage through its own framing rather than this classifier
/// guessing wrong silently.
pub async fn classify<S: Peekable + ?Sized>(stream: &S) -> Protocol {
    match tokio::time::timeout(CLASSIFY_TIMEOUT, classify_inner(stream)).await {
        Ok(Ok(protocol)) => protocol,
        Ok(Err(_)) | Err(_) => Protocol::Http1,
    }
}

async fn classify_inner<S: Peekable + ?Sized>(stream: &S) -> io::Result<Protocol> {
    let mut buf = [0u8; HTTP2_PREFACE.len()];
    loop {
        let n = stream.peek(&mut buf).await?;
        if n == buf.len() {
            return Ok(if buf == *HTTP2_PREFACE { Protocol::Rpc } else { Protocol::Http1 });
        }
        if n == 0 {
            // Peer closed before sending a full preface worth of bytes.
            return Ok(Protocol::Http1);
        }
        tokio::time::sleep(PEEK_RETRY_DELAY).await;
    }
}
