//! Server-stream and client-stream round trips against a real `rpc-server`
//! instance, including trailer access after the stream completes.

mod common;

use common::{EchoItem, ListRequest, LIST_PROCEDURE, SUM_PROCEDURE};
use futures::StreamExt;
use rpc_client::ConnectClient;

#[tokio::test]
async fn server_stream_round_trip_with_trailers() {
    let (base_url, mut server) = common::spawn_server(18_091).await;

    let client = ConnectClient::builder(base_url.as_str()).build().expect("client builds");
    let response = client
        .call_server_stream::<ListRequest, EchoItem>(LIST_PROCEDURE, &ListRequest { count: 5 })
        .await
        .expect("server stream starts");

    let mut stream = response.into_inner();
    let mut items = Vec::new();
    while let Some(item) = stream.next().await {
        items.push(item.expect("item decodes"));
    }

    assert_eq!(items.len(), 5);
    assert_eq!(items.iter().map(|i| i.index).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);

    // The EndStream frame has been consumed by now; trailers (if any were
    // sent) are available on the stream.
    let _ = stream.trailers();

    server.stop(true).await.ok();
}

#[tokio::test]
async fn server_stream_empty_list() {
    let (base_url, mut server) = common::spawn_server(18_092).await;

    let client = ConnectClient::builder(base_url.as_str()).build().expect("client builds");
    let response = client
        .call_server_stream::<ListRequest, EchoItem>(LIST_PROCEDURE, &ListRequest { count: 0 })
        .await
        .expect("server stream starts");

    let items: Vec<_> = response.into_inner().collect().await;
    assert!(items.is_empty());

    server.stop(true).await.ok();
}

#[tokio::test]
async fn client_stream_round_trip() {
    let (base_url, mut server) = common::spawn_server(18_093).await;

    let client = ConnectClient::builder(base_url.as_str()).build().expect("client builds");
    let requests = futures::stream::iter((0..4).map(|index| EchoItem { index }));

    let response = client
        .call_client_stream::<EchoItem, common::SumResponse, _>(SUM_PROCEDURE, requests)
        .await
        .expect("client stream completes");

    assert_eq!(response.into_inner().total, 0 + 1 + 2 + 3);

    server.stop(true).await.ok();
}
