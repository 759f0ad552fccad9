//! Shared fixtures for the integration tests: a tiny echo service exercised
//! over a real `rpc-server` instance bound to a loopback port.

use std::sync::Arc;

use rpc_server::{BindAddress, Server, ServerBuilder, ServiceProvider, ServiceRegistrar};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

pub const ECHO_PROCEDURE: &str = "test.v1.EchoService/Echo";
pub const LIST_PROCEDURE: &str = "test.v1.EchoService/List";
pub const SUM_PROCEDURE: &str = "test.v1.EchoService/Sum";
pub const FLAKY_PROCEDURE: &str = "test.v1.EchoService/Flaky";

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct EchoRequest {
    #[prost(string, tag = "1")]
    pub message: String,
}

impl rpc_server::Validatable for EchoRequest {
    fn validate(&self) -> Result<(), String> {
        if self.message.is_empty() {
            return Err("message must not be empty".into());
        }
        Ok(())
    }
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct EchoResponse {
    #[prost(string, tag = "1")]
    pub message: String,
}

impl rpc_server::Validatable for EchoResponse {}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct ListRequest {
    #[prost(int32, tag = "1")]
    pub count: i32,
}

impl rpc_server::Validatable for ListRequest {}
impl rpc_server::Validatable for EchoItem {}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct EchoItem {
    #[prost(int32, tag = "1")]
    pub index: i32,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct SumResponse {
    #[prost(int32, tag = "1")]
    pub total: i32,
}

impl rpc_server::Validatable for SumResponse {}

mod handlers {
    use super::*;
    use axum::extract::Extension;
    use axum::response::Response;
    use futures::StreamExt;
    use rpc_server::{ConnectContext, ConnectRequest, ConnectResponse, StreamBody, Streaming};

    pub async fn echo(
        ctx: Extension<ConnectContext>,
        ConnectRequest(req): ConnectRequest<EchoRequest>,
    ) -> Response {
        ConnectResponse::new(EchoResponse { message: req.message }).into_response_with_context(&ctx)
    }

    pub async fn list(
        ctx: Extension<ConnectContext>,
        ConnectRequest(req): ConnectRequest<ListRequest>,
    ) -> Response {
        let count = req.count;
        let stream = futures::stream::iter((0..count).map(|index| Ok(EchoItem { index })));
        ConnectResponse::new(StreamBody::new(stream)).into_response_with_context(&ctx)
    }

    pub async fn sum(
        ctx: Extension<ConnectContext>,
        ConnectRequest(stream): ConnectRequest<Streaming<EchoItem>>,
    ) -> Response {
        let mut stream = stream;
        let mut total = 0;
        while let Some(item) = stream.next().await {
            match item {
                Ok(item) => total += item.index,
                Err(err) => return err.into_response_with_protocol(ctx.protocol),
            }
        }
        ConnectResponse::new(SumResponse { total }).into_streaming_response_with_context(&ctx)
    }

    /// Fails with `Unavailable` on the first two calls, then succeeds.
    /// Backed by a counter shared across calls via the handler closure.
    async fn flaky(
        ctx: Extension<ConnectContext>,
        ConnectRequest(req): ConnectRequest<EchoRequest>,
        counter: Arc<std::sync::atomic::AtomicU32>,
    ) -> Response {
        use std::sync::atomic::Ordering;
        let attempt = counter.fetch_add(1, Ordering::SeqCst);
        if attempt < 2 {
            return rpc_server::ConnectError::new(
                rpc_server::Code::Unavailable,
                "flaky service warming up",
            )
            .into_response_with_protocol(ctx.protocol);
        }
        ConnectResponse::new(EchoResponse { message: req.message }).into_response_with_context(&ctx)
    }

    /// Builds the `/Flaky` route, closing over its own failure counter.
    pub fn flaky_route(
        counter: Arc<std::sync::atomic::AtomicU32>,
    ) -> axum::routing::MethodRouter {
        axum::routing::post(
            move |ctx: Extension<ConnectContext>, req: ConnectRequest<EchoRequest>| {
                flaky(ctx, req, counter.clone())
            },
        )
    }
}

struct EchoService {
    flaky_counter: Arc<std::sync::atomic::AtomicU32>,
}

impl ServiceProvider for EchoService {
    fn server_setup(&self, registrar: &mut ServiceRegistrar) {
        use axum::routing::post;

        let router = axum::Router::new()
            .route(&format!("/{ECHO_PROCEDURE}"), post(handlers::echo))
            .route(&format!("/{LIST_PROCEDURE}"), post(handlers::list))
            .route(&format!("/{SUM_PROCEDURE}"), post(handlers::sum))
            .route(
                &format!("/{FLAKY_PROCEDURE}"),
                handlers::flaky_route(self.flaky_counter.clone()),
            );
        registrar.add_router(router);
    }
}

/// Starts a real server on `port` and returns its base URL plus a handle that
/// stops the server when the test is done with it.
pub async fn spawn_server(port: u16) -> (String, Server) {
    let config = ServerBuilder::new(BindAddress::Tcp { host: "127.0.0.1".into(), port })
        .add_service(Arc::new(EchoService {
            flaky_counter: Arc::new(std::sync::atomic::AtomicU32::new(0)),
        }))
        .build();

    let mut server = Server::new(config);
    let ready = Arc::new(Notify::new());
    server.start(ready).await.expect("server should start");

    // `start` only schedules the accept loop on a background task; give it a
    // moment to bind the listener before the test dials it.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    (format!("http://127.0.0.1:{port}"), server)
}
