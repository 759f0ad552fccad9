//! WebSocket-to-bidirectional-stream proxy.
//!
//! Bridges a browser WebSocket connection to a Connect bidi-streaming RPC
//! call on the gateway's internal client. Each text frame received from the
//! browser is JSON-decoded into `Req` and forwarded to the call; each `Res`
//! message streamed back is JSON-encoded and sent as a text frame.
//!
//! A universal, type-erased version of this (wrapping the whole gateway
//! handler outermost, as in the original "wraps the handler outermost of
//! all above" ordering) isn't expressible without knowing `Req`/`Res` at
//! compile time, so this is exposed as a helper a service mounts on its own
//! route from [`super::HttpServiceProvider::gateway_setup`] rather than a
//! gateway-wide layer.

use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use prost::Message as ProstMessage;
use rpc_client::ConnectClient;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Proxies messages between `socket` and a bidi-streaming call to
/// `procedure` on `client`. Returns once both directions have finished.
pub async fn proxy_bidi_stream<Req, Res>(socket: WebSocket, client: Arc<ConnectClient>, procedure: String)
where
    Req: ProstMessage + Serialize + DeserializeOwned + Default + Send + 'static,
    Res: ProstMessage + Serialize + DeserializeOwned + Default + Send + 'static,
{
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (req_tx, req_rx) = futures::channel::mpsc::unbounded::<Req>();

    let forward_in = async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                WsMessage::Text(text) => {
                    if let Ok(req) = serde_json::from_str::<Req>(&text) {
                        if req_tx.unbounded_send(req).is_err() {
                            break;
                        }
                    }
                }
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
    };

    let forward_out = async move {
        let response = match client.call_bidi_stream::<Req, Res, _>(&procedure, req_rx).await {
            Ok(response) => response,
            Err(err) => {
                let _ = ws_tx.send(close_frame(&err.to_string())).await;
                return;
            }
        };

        let mut stream = response.into_inner();
        while let Some(item) = stream.next().await {
            match item {
                Ok(message) => match serde_json::to_string(&message) {
                    Ok(text) => {
                        if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                },
                Err(err) => {
                    let _ = ws_tx.send(close_frame(&err.to_string())).await;
                    break;
                }
            }
        }
        let _ = ws_tx.send(WsMessage::Close(None)).await;
    };

    futures::future::join(forward_in, forward_out).await;
}

fn close_frame(reason: &str) -> WsMessage {
    WsMessage::Close(Some(CloseFrame {
        code: 1011,
        reason: reason.to_string().into(),
    }))
}
