//! Connection count limiting at the listener level.
//!
//! [`LimitedListener`] wraps any acceptor exposing an `accept()` returning an
//! `(IO, Addr)` pair (matching `tokio::net::TcpListener`/`UnixListener`) with
//! a [`tokio::sync::Semaphore`] of fixed size. Each accepted connection holds
//! a permit for its lifetime; the permit is released exactly once on drop.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Wraps an acceptor, capping the number of concurrently live connections.
///
/// `n = 0` means unlimited (no semaphore is consulted).
pub struct LimitedListener<L> {
    inner: L,
    semaphore: Option<Arc<Semaphore>>,
}

impl<L> LimitedListener<L> {
    pub fn new(inner: L, max_connections: u32) -> Self {
        let semaphore = if max_connections == 0 {
            None
        } else {
            Some(Arc::new(Semaphore::new(max_connections as usize)))
        };
        Self { inner, semaphore }
    }

    /// Currently available permits. Always `usize::MAX` when unlimited.
    pub fn available_permits(&self) -> usize {
        self.semaphore
            .as_ref()
            .map(|s| s.available_permits())
            .unwrap_or(usize::MAX)
    }
}

impl<L, IO, Addr> LimitedListener<L>
where
    L: Acceptor<IO, Addr>,
{
    /// Accept the next connection, blocking until a permit is available.
    pub async fn accept(&self) -> std::io::Result<(Limited<IO>, Addr)> {
        let permit = match &self.semaphore {
            Some(semaphore) => Some(
                semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .expect("semaphore is never closed"),
            ),
            None => None,
        };

        let (io, addr) = self.inner.accept().await?;
        Ok((Limited { io, _permit: permit }, addr))
    }
}

/// An accepted connection holding a permit against the listener's limit.
///
/// The permit is released when this value is dropped, regardless of how the
/// connection ends (graceful close, error, task abort).
pub struct Limited<IO> {
    io: IO,
    _permit: Option<OwnedSemaphorePermit>,
}

impl<IO> std::ops::Deref for Limited<IO> {
    type Target = IO;
    fn deref(&self) -> &IO {
        &self.io
    }
}

impl<IO> std::ops::DerefMut for Limited<IO> {
    fn deref_mut(&mut self) -> &mut IO {
        &mut self.io
    }
}

impl<IO> Limited<IO> {
    pub fn into_inner(self) -> IO {
        self.io
    }

    /// Wraps `io` with an already-acquired permit. Used by acceptors that
    /// don't go through [`LimitedListener::accept`] directly (e.g.
    /// `rpc-server::server`'s manual TCP/TLS accept loop, which needs the
    /// permit held for the stream's lifetime but owns its own accept loop).
    pub(crate) fn with_permit(io: IO, permit: Option<OwnedSemaphorePermit>) -> Self {
        Self { io, _permit: permit }
    }

    /// Splits back into the raw IO and its permit, e.g. to perform a TLS
    /// handshake on the raw stream and re-wrap the resulting stream with
    /// the same permit.
    pub(crate) fn into_parts(self) -> (IO, Option<OwnedSemaphorePermit>) {
        (self.io, self._permit)
    }
}

// `IO` is always `Unpin` in practice (`TcpStream`, `UnixStream`, and
// `tokio_rustls::server::TlsStream` all are), so projecting through `Pin` is
// just `get_mut` -- no `pin-project` needed. This lets `Limited<IO>` stand in
// for `IO` directly as an acceptor's stream type, so the permit's lifetime
// matches the connection's lifetime even under a manual accept loop that
// doesn't go through `LimitedListener::accept`.
impl<IO: tokio::io::AsyncRead + Unpin> tokio::io::AsyncRead for Limited<IO> {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.get_mut().io).poll_read(cx, buf)
    }
}

impl<IO: tokio::io::AsyncWrite + Unpin> tokio::io::AsyncWrite for Limited<IO> {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        std::pin::Pin::new(&mut self.get_mut().io).poll_write(cx, buf)
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.get_mut().io).poll_flush(cx)
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.get_mut().io).poll_shutdown(cx)
    }
}

/// An acceptor of `(IO, Addr)` pairs. Implemented for
/// `tokio::net::TcpListener` and `tokio::net::UnixListener` by the host
/// binary (or here, behind feature gates, if a specific transport is always
/// used); kept generic so `LimitedListener` has no hard transport dependency.
pub trait Acceptor<IO, Addr> {
    fn accept(&self) -> impl std::future::Future<Output = std::io::Result<(IO, Addr)>> + Send;
}

impl Acceptor<tokio::net::TcpStream, std::net::SocketAddr> for tokio::net::TcpListener {
    async fn accept(&self) -> std::io::Result<(tokio::net::TcpStream, std::net::SocketAddr)> {
        tokio::net::TcpListener::accept(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unlimited_listener_never_blocks_on_permits() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let limited = LimitedListener::new(listener, 0);
        assert_eq!(limited.available_permits(), usize::MAX);
    }

    #[tokio::test]
    async fn limited_listener_reports_available_permits() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let limited = LimitedListener::new(listener, 4);
        assert_eq!(limited.available_permits(), 4);
    }
}
