//! Retry policy exercised against a handler that fails its first two calls
//! with `Unavailable` and then succeeds.

mod common;

use common::{EchoRequest, FLAKY_PROCEDURE};
use rpc_client::{retry_with_policy, ClientError, ConnectClient, RetryPolicy};
use rpc_core::Code;
use std::time::Duration;

#[tokio::test]
async fn retry_recovers_from_transient_unavailability() {
    let (base_url, mut server) = common::spawn_server(18_101).await;

    let client = ConnectClient::builder(base_url.as_str()).build().expect("client builds");
    let policy = RetryPolicy::new()
        .max_retries(5)
        .base_delay(Duration::from_millis(5))
        .max_delay(Duration::from_millis(50));

    let response = retry_with_policy(&policy, || {
        client.call_unary::<EchoRequest, common::EchoResponse>(
            FLAKY_PROCEDURE,
            &EchoRequest { message: "retry me".into() },
        )
    })
    .await
    .expect("eventually succeeds after two retries");

    assert_eq!(response.into_inner().message, "retry me");

    server.stop(true).await.ok();
}

#[tokio::test]
async fn no_retry_policy_fails_on_first_transient_error() {
    let (base_url, mut server) = common::spawn_server(18_102).await;

    let client = ConnectClient::builder(base_url.as_str()).build().expect("client builds");
    let policy = RetryPolicy::no_retry();

    let err = retry_with_policy(&policy, || {
        client.call_unary::<EchoRequest, common::EchoResponse>(
            FLAKY_PROCEDURE,
            &EchoRequest { message: "no retry".into() },
        )
    })
    .await
    .expect_err("the flaky handler still fails on the very first attempt");

    assert_eq!(err.code(), Code::Unavailable);
    assert!(err.is_retryable());
    let _: ClientError = err;

    server.stop(true).await.ok();
}
