//! Unary call round trips against a real `rpc-server` instance: JSON and
//! proto encoding, error mapping, and the response wrapper's metadata access.

mod common;

use common::{EchoRequest, ECHO_PROCEDURE};
use rpc_client::{ClientError, ConnectClient};
use rpc_core::Code;

#[tokio::test]
async fn unary_json_round_trip() {
    let (base_url, mut server) = common::spawn_server(18_081).await;

    let client = ConnectClient::builder(base_url.as_str()).build().expect("client builds");
    let response = client
        .call_unary::<EchoRequest, common::EchoResponse>(
            ECHO_PROCEDURE,
            &EchoRequest { message: "hello".into() },
        )
        .await
        .expect("unary call succeeds");

    assert_eq!(response.get_ref().message, "hello");
    server.stop(true).await.ok();
}

#[tokio::test]
async fn unary_proto_round_trip() {
    let (base_url, mut server) = common::spawn_server(18_082).await;

    let client = ConnectClient::builder(base_url.as_str())
        .use_proto()
        .build()
        .expect("client builds");
    let response = client
        .call_unary::<EchoRequest, common::EchoResponse>(
            ECHO_PROCEDURE,
            &EchoRequest { message: "proto hello".into() },
        )
        .await
        .expect("unary call succeeds");

    assert_eq!(response.into_inner().message, "proto hello");
    server.stop(true).await.ok();
}

#[tokio::test]
async fn unary_validation_failure_maps_to_invalid_argument() {
    let (base_url, mut server) = common::spawn_server(18_083).await;

    let client = ConnectClient::builder(base_url.as_str()).build().expect("client builds");
    let err = client
        .call_unary::<EchoRequest, common::EchoResponse>(
            ECHO_PROCEDURE,
            &EchoRequest { message: String::new() },
        )
        .await
        .expect_err("empty message is rejected by the server's Validatable impl");

    assert_eq!(err.code(), Code::InvalidArgument);
    assert!(matches!(err, ClientError::Rpc(_)));
    server.stop(true).await.ok();
}

#[tokio::test]
async fn unary_response_carries_metadata_headers() {
    let (base_url, mut server) = common::spawn_server(18_084).await;

    let client = ConnectClient::builder(base_url.as_str()).build().expect("client builds");
    let response = client
        .call_unary::<EchoRequest, common::EchoResponse>(
            ECHO_PROCEDURE,
            &EchoRequest { message: "with headers".into() },
        )
        .await
        .expect("unary call succeeds");

    let (message, metadata) = response.into_parts();
    assert_eq!(message.message, "with headers");
    assert_eq!(
        metadata.get("content-type"),
        Some("application/json")
    );
    server.stop(true).await.ok();
}
