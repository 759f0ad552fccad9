//! `Server`: construction, `Start`, `Stop`.
//!
//! [`tokio::task::JoinSet`] stands in for an "error group": every serving
//! task is a member, the first one to return an error wins, and
//! [`JoinSet::shutdown`] aborts the rest.

use std::io;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;

use super::chain::build_chain;
use super::config::{BindAddress, ServerConfig};
use super::registrar::ServiceRegistrar;
use crate::context::MessageLimits;
use crate::gateway::Gateway;
use crate::health::HealthService;
use crate::layer::ConnectLayer;
use crate::net::limiter::Limited;
use crate::net::tls::server_tls_config;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("no services registered")]
    NoServices,
    #[error("address resolution failed: {0}")]
    Address(#[from] crate::net::AddressError),
    #[error("TLS configuration failed: {0}")]
    Tls(#[from] crate::net::TlsConfigError),
    #[error("failed to bind listener: {0}")]
    Listener(#[source] io::Error),
    #[error("gateway error: {0}")]
    Gateway(#[from] crate::gateway::GatewayError),
    #[error("serving task failed: {0}")]
    Serve(String),
    #[error("server was already stopped")]
    AlreadyStopped,
}

/// `NEW → CONFIGURED → STARTED → STOPPING → STOPPED`. Double-`Start` is
/// implementation-defined (this implementation returns `AlreadyStopped`-free
/// but simply re-runs `Start`'s setup, since nothing here makes that unsafe);
/// double-`Stop` is a documented no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    New,
    Configured,
    Started,
    Stopping,
    Stopped,
}

/// An embeddable RPC server: one process, one bind target, speaking gRPC,
/// gRPC-Web, and Connect to the same handlers, with an optional colocated
/// REST gateway.
pub struct Server {
    config: ServerConfig,
    state: ServerState,
    gateway: Option<Gateway>,
    tasks: JoinSet<Result<(), ServerError>>,
    shutdown: Arc<Notify>,
    started: bool,
}

impl Server {
    /// The `Gateway` itself (if configured) isn't built until `start`, since
    /// building it needs the internal client endpoint, which depends on the
    /// RPC listener's resolved bind address.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            gateway: None,
            state: ServerState::Configured,
            tasks: JoinSet::new(),
            shutdown: Arc::new(Notify::new()),
            started: false,
            config,
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    /// `unix://<path>` for Unix sockets, `<host>:<port>` for TCP.
    pub fn endpoint(&self) -> String {
        self.config.bind.endpoint()
    }

    /// Binds listeners and spawns the accept loops. `ready` is notified once,
    /// non-blocking (`Notify::notify_waiters` never blocks the caller), right
    /// before this function returns successfully.
    pub async fn start(&mut self, ready: Arc<Notify>) -> Result<(), ServerError> {
        let mut registrar = ServiceRegistrar::new();

        // 1. Append the health service iff a probe was registered.
        if let Some(probe) = &self.config.health_probe {
            let health = HealthService::new(probe.clone());
            registrar.add_router(health.router());
        }

        // 2. Fail fast if nothing is registered at all.
        if self.config.services.is_empty() && self.config.health_probe.is_none() {
            return Err(ServerError::NoServices);
        }

        for service in &self.config.services {
            service.server_setup(&mut registrar);
        }

        #[cfg(feature = "tonic")]
        let (router, grpc_routes) = registrar.into_parts();
        #[cfg(not(feature = "tonic"))]
        let router = registrar.into_parts();

        // 3. Interceptor chain, then protocol framing.
        let router = build_chain(router, &self.config);
        let connect_layer = ConnectLayer::new()
            .limits(MessageLimits::default())
            .input_validation(self.config.input_validation);
        let mut router = router.layer(connect_layer);

        // Gateway sharing the RPC port rides the same router -- every
        // connection on that port is still byte-classified per-connection
        // by `serve_classified` below, RPC vs HTTP/1, before either framing
        // begins; see `crate::mux`.
        let mut dedicated_gateway: Option<(u16, Router<()>)> = None;
        let mut unix_gateway_listener: Option<TcpListener> = None;
        if let Some(gateway_config) = self.config.gateway.take() {
            let mut gateway = Gateway::new(gateway_config);

            // The RPC endpoint is a unix socket, so the gateway's internal
            // client has no TCP peer to dial directly: assign it a free
            // loopback TCP port and serve the RPC dispatch service there too.
            let unix_gateway_port = if matches!(self.config.bind, BindAddress::Unix(_)) {
                let listener = TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
                    .await
                    .map_err(ServerError::Listener)?;
                let port = listener.local_addr().map_err(ServerError::Listener)?.port();
                unix_gateway_listener = Some(listener);
                Some(port)
            } else {
                None
            };

            let internal_endpoint = internal_client_endpoint(&self.config.bind, unix_gateway_port);
            gateway.connect(&internal_endpoint)?;

            let providers: Vec<&dyn crate::gateway::HttpServiceProvider> = self
                .config
                .services
                .iter()
                .filter_map(|s| s.as_http_service_provider())
                .collect();
            let gateway_router = gateway.build_router(&providers)?;

            let port = gateway.config().port;
            if port == 0 {
                router = router.merge(gateway_router);
            } else {
                dedicated_gateway = Some((port, gateway_router));
            }
            self.gateway = Some(gateway);
        }

        #[cfg(feature = "tonic")]
        let dispatch_service = {
            use crate::tonic::ContentTypeSwitch;
            ContentTypeSwitch::new(grpc_routes.prepare(), router)
        };
        #[cfg(not(feature = "tonic"))]
        let dispatch_service = router;

        // 5/6. Reflection and Prometheus pre-registration are left to the
        // embedding binary: reflection needs encoded `FileDescriptorSet`
        // bytes this framework has no way to produce on its own (no
        // build.rs-driven codegen step lives in `rpc-server`), and
        // per-method Prometheus pre-registration needs the method name
        // table, which only the generated service code has. Both hooks are
        // exposed as plain functions (`crate::interceptor::PrometheusLayer::register_known_methods`,
        // `tonic_reflection` directly) rather than re-implemented here.

        // 7/9. Acquire the main listener and launch serving tasks.
        let semaphore = if self.config.limits.connections == 0 {
            None
        } else {
            Some(Arc::new(Semaphore::new(self.config.limits.connections as usize)))
        };

        match &self.config.bind {
            BindAddress::Tcp { host, port } => {
                let ip = crate::net::address::resolve(host)?;
                let addr = std::net::SocketAddr::new(ip, *port);
                self.spawn_tcp_task(addr, dispatch_service, semaphore.clone())?;
            }
            BindAddress::Unix(path) => {
                if let Some(listener) = unix_gateway_listener {
                    self.spawn_bound_tcp_task(listener, dispatch_service.clone(), semaphore.clone())?;
                }
                self.spawn_unix_task(path.clone(), dispatch_service, semaphore.clone())?;
            }
        }

        if let Some((port, gateway_router)) = dedicated_gateway {
            let addr = std::net::SocketAddr::new(std::net::Ipv4Addr::UNSPECIFIED.into(), port);
            self.spawn_tcp_task(addr, gateway_router, semaphore)?;
        }

        self.state = ServerState::Started;
        self.started = true;
        ready.notify_waiters();
        Ok(())
    }

    fn spawn_tcp_task<S>(
        &mut self,
        addr: std::net::SocketAddr,
        service: S,
        semaphore: Option<Arc<Semaphore>>,
    ) -> Result<(), ServerError>
    where
        S: tower::Service<axum::http::Request<Body>, Error = std::convert::Infallible>
            + Clone
            + Send
            + 'static,
        S::Response: axum::response::IntoResponse + 'static,
        S::Future: Send + 'static,
    {
        let tls = self
            .config
            .tls
            .as_ref()
            .map(|material| {
                server_tls_config(material.cert_chain.clone(), material.key.clone_key(), material.client_cas.clone())
            })
            .transpose()?;

        let shutdown = self.shutdown.clone();
        self.tasks.spawn(async move {
            let listener = TcpListener::bind(addr).await.map_err(ServerError::Listener)?;
            let tls_acceptor = tls.map(|cfg| tokio_rustls_acceptor(cfg));

            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        let (stream, _peer) = accepted.map_err(ServerError::Listener)?;
                        let permit = match &semaphore {
                            Some(sem) => Some(sem.clone().acquire_owned().await.expect("semaphore is never closed")),
                            None => None,
                        };
                        let service = service.clone();
                        let tls_acceptor = tls_acceptor.clone();
                        tokio::spawn(async move {
                            let stream = Limited::with_permit(stream, permit);
                            if let Some(acceptor) = tls_acceptor {
                                // ALPN already pinned this connection to h2
                                // (see `net::tls::DEFAULT_ALPN_PROTOCOLS`), so
                                // there's nothing left to classify.
                                if let Ok(tls_stream) = acceptor.accept(stream).await {
                                    let _ = serve_http2_only(tls_stream, service).await;
                                }
                            } else {
                                serve_classified(stream, service).await;
                            }
                        });
                    }
                    _ = shutdown.notified() => return Ok(()),
                }
            }
        });
        Ok(())
    }

    /// Like [`Self::spawn_tcp_task`], but against an already-bound listener
    /// and without TLS -- used for the gateway's internal loopback port when
    /// the RPC server itself binds a unix socket.
    fn spawn_bound_tcp_task<S>(
        &mut self,
        listener: TcpListener,
        service: S,
        semaphore: Option<Arc<Semaphore>>,
    ) -> Result<(), ServerError>
    where
        S: tower::Service<axum::http::Request<Body>, Error = std::convert::Infallible>
            + Clone
            + Send
            + 'static,
        S::Response: axum::response::IntoResponse + 'static,
        S::Future: Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        self.tasks.spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        let (stream, _peer) = accepted.map_err(ServerError::Listener)?;
                        let permit = match &semaphore {
                            Some(sem) => Some(sem.clone().acquire_owned().await.expect("semaphore is never closed")),
                            None => None,
                        };
                        let service = service.clone();
                        tokio::spawn(async move {
                            let stream = Limited::with_permit(stream, permit);
                            serve_classified(stream, service).await;
                        });
                    }
                    _ = shutdown.notified() => return Ok(()),
                }
            }
        });
        Ok(())
    }

    fn spawn_unix_task<S>(
        &mut self,
        path: std::path::PathBuf,
        service: S,
        semaphore: Option<Arc<Semaphore>>,
    ) -> Result<(), ServerError>
    where
        S: tower::Service<axum::http::Request<Body>, Error = std::convert::Infallible>
            + Clone
            + Send
            + 'static,
        S::Response: axum::response::IntoResponse + 'static,
        S::Future: Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        self.tasks.spawn(async move {
            let _ = std::fs::remove_file(&path);
            let listener = UnixListener::bind(&path).map_err(ServerError::Listener)?;

            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        let (stream, _peer) = accepted.map_err(ServerError::Listener)?;
                        let permit = match &semaphore {
                            Some(sem) => Some(sem.clone().acquire_owned().await.expect("semaphore is never closed")),
                            None => None,
                        };
                        let service = service.clone();
                        tokio::spawn(async move {
                            let stream = Limited::with_permit(stream, permit);
                            serve_classified(stream, service).await;
                        });
                    }
                    _ = shutdown.notified() => return Ok(()),
                }
            }
        });
        Ok(())
    }

    /// Stops the server, idempotently: cancels in-flight work (or waits for
    /// it to drain when `graceful`), closes the gateway's internal client,
    /// and aborts every serving task.
    pub async fn stop(&mut self, graceful: bool) -> Result<(), ServerError> {
        if !self.started {
            return Ok(());
        }
        self.state = ServerState::Stopping;

        if let Some(gateway) = &mut self.gateway {
            gateway.shutdown();
        }

        self.shutdown.notify_waiters();

        if graceful {
            // Give in-flight tasks a chance to observe the notification and
            // return cleanly before the hard abort below.
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }

        self.tasks.shutdown().await;
        self.started = false;
        self.state = ServerState::Stopped;
        Ok(())
    }
}

/// The loopback address the gateway's internal client dials to reach this
/// RPC server. A TCP RPC server is dialed directly on its own port; a
/// Unix-socket RPC server has no TCP peer for the gateway to dial, so
/// `unix_gateway_port` must be the free TCP port `Server::start` bound and
/// is serving the same dispatch service on.
fn internal_client_endpoint(bind: &BindAddress, unix_gateway_port: Option<u16>) -> String {
    match bind {
        BindAddress::Tcp { port, .. } => format!("http://127.0.0.1:{port}"),
        BindAddress::Unix(_) => {
            let port = unix_gateway_port.expect("unix RPC bind with a gateway always assigns a free TCP port");
            format!("http://127.0.0.1:{port}")
        }
    }
}

#[derive(Clone)]
struct TlsAcceptor(tokio_rustls::TlsAcceptor);

fn tokio_rustls_acceptor(config: rustls::ServerConfig) -> TlsAcceptor {
    TlsAcceptor(tokio_rustls::TlsAcceptor::from(Arc::new(config)))
}

impl TlsAcceptor {
    async fn accept<IO>(&self, stream: Limited<IO>) -> io::Result<Limited<tokio_rustls::server::TlsStream<IO>>>
    where
        IO: AsyncRead + AsyncWrite + Unpin,
    {
        let (io, permit) = stream.into_parts();
        let tls_stream = self.0.accept(io).await?;
        Ok(Limited::with_permit(tls_stream, permit))
    }
}

/// Peeks `stream` via [`crate::mux::classify`] and drives it with whichever
/// builder matches: `.http2_only()` for the RPC branch, the auto-detecting
/// builder otherwise. Both halves dispatch through the same `service`, so
/// classification only changes how the connection is framed, never which
/// handlers can be reached -- the REST gateway merged into `service` is
/// equally reachable from either branch, just over HTTP/1 or HTTP/2.
async fn serve_classified<IO, S>(stream: Limited<IO>, service: S)
where
    IO: AsyncRead + AsyncWrite + Unpin + Send + crate::mux::Peekable + 'static,
    S: tower::Service<axum::http::Request<Body>, Error = std::convert::Infallible> + Clone + Send + 'static,
    S::Response: axum::response::IntoResponse + 'static,
    S::Future: Send + 'static,
{
    let result = match crate::mux::classify(&*stream).await {
        crate::mux::Protocol::Rpc => serve_http2_only(stream, service).await,
        crate::mux::Protocol::Http1 => serve_http2(stream, service).await,
    };
    let _ = result;
}

/// Serves one accepted connection letting `hyper_util` auto-detect HTTP/1.1
/// vs HTTP/2, dispatching every request through `service`.
async fn serve_http2<IO, S>(stream: IO, service: S) -> Result<(), ServerError>
where
    IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    S: tower::Service<axum::http::Request<Body>, Error = std::convert::Infallible> + Clone + Send + 'static,
    S::Response: axum::response::IntoResponse + 'static,
    S::Future: Send + 'static,
{
    let io = hyper_util::rt::TokioIo::new(stream);
    let make_service = hyper::service::service_fn(move |req: axum::http::Request<hyper::body::Incoming>| {
        let mut service = service.clone();
        async move {
            let req = req.map(Body::new);
            tower::Service::call(&mut service, req)
                .await
                .map(|resp| resp.into_response())
        }
    });

    hyper_util::server::conn::auto::Builder::new(hyper_util::rt::TokioExecutor::new())
        .serve_connection(io, make_service)
        .await
        .map_err(|err| ServerError::Serve(err.to_string()))
}

/// Like [`serve_http2`], but restricted to `.http2_only()`: the framing this
/// framework's RPC transport actually speaks (see
/// `net::tls::DEFAULT_ALPN_PROTOCOLS`), used once a connection is already
/// known to be HTTP/2 -- via TLS ALPN or via [`crate::mux::classify`].
async fn serve_http2_only<IO, S>(stream: IO, service: S) -> Result<(), ServerError>
where
    IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    S: tower::Service<axum::http::Request<Body>, Error = std::convert::Infallible> + Clone + Send + 'static,
    S::Response: axum::response::IntoResponse + 'static,
    S::Future: Send + 'static,
{
    let io = hyper_util::rt::TokioIo::new(stream);
    let make_service = hyper::service::service_fn(move |req: axum::http::Request<hyper::body::Incoming>| {
        let mut service = service.clone();
        async move {
            let req = req.map(Body::new);
            tower::Service::call(&mut service, req)
                .await
                .map(|resp| resp.into_response())
        }
    });

    hyper_util::server::conn::auto::Builder::new(hyper_util::rt::TokioExecutor::new())
        .http2_only()
        .serve_connection(io, make_service)
        .await
        .map_err(|err| ServerError::Serve(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_client_endpoint_for_tcp_uses_its_own_port() {
        let bind = BindAddress::Tcp { host: "local".into(), port: 8080 };
        assert_eq!(internal_client_endpoint(&bind, None), "http://127.0.0.1:8080");
    }

    #[test]
    fn internal_client_endpoint_for_unix_uses_the_assigned_gateway_port() {
        let bind = BindAddress::Unix("/tmp/rpc.sock".into());
        assert_eq!(internal_client_endpoint(&bind, Some(54321)), "http://127.0.0.1:54321");
    }

    #[test]
    #[should_panic(expected = "unix RPC bind with a gateway always assigns a free TCP port")]
    fn internal_client_endpoint_for_unix_without_a_port_panics() {
        let bind = BindAddress::Unix("/tmp/rpc.sock".into());
        let _ = internal_client_endpoint(&bind, None);
    }

    #[tokio::test]
    async fn serve_classified_serves_a_plain_http1_request_through_the_auto_branch() {
        use axum::routing::get;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router: Router<()> = Router::new().route("/check", get(|| async { "ok" }));

        tokio::spawn(async move {
            let (stream, _peer) = listener.accept().await.unwrap();
            serve_classified(Limited::with_permit(stream, None), router).await;
        });

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        stream
            .write_all(b"GET /check HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        let response = String::from_utf8_lossy(&response);
        assert!(response.starts_with("HTTP/1.1 200"), "unexpected response: {response}");
        assert!(response.ends_with("ok"), "unexpected response body: {response}");
    }
}
