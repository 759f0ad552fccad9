//! Built-in health service.
//!
//! [`HealthService`] wraps a single [`HealthProbe`] and exposes it two ways:
//! a Connect/Axum JSON router (`check`/`watch`, always available) and,
//! behind the `tonic` feature, a `tonic-health`-backed gRPC health service.
//! [`Server::start`](crate::server::Server::start) appends this service to
//! the service list automatically iff a probe was registered.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

/// A liveness/readiness probe for one named service.
#[async_trait::async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self, service: &str) -> Result<(), HealthError>;
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct HealthError(pub String);

/// The interval `Watch` re-runs the probe at when nothing else changed it.
pub const WATCH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServingStatus {
    Serving,
    NotServing,
}

impl ServingStatus {
    fn from_probe_result(result: &Result<(), HealthError>) -> Self {
        match result {
            Ok(()) => ServingStatus::Serving,
            Err(_) => ServingStatus::NotServing,
        }
    }
}

#[derive(Debug, Serialize)]
struct CheckResponse {
    status: ServingStatus,
}

#[derive(Debug, Deserialize)]
struct HealthQuery {
    #[serde(default)]
    service: String,
}

/// Shares one [`HealthProbe`] between the Connect/JSON router and (behind
/// `tonic`) the gRPC health service.
pub struct HealthService {
    probe: Arc<dyn HealthProbe>,
}

impl HealthService {
    pub fn new(probe: Arc<dyn HealthProbe>) -> Self {
        Self { probe }
    }

    /// `GET /health.v1.Health/Check?service=<name>` → `{"status": "SERVING" | "NOT_SERVING"}`.
    pub fn router(&self) -> Router<()> {
        Router::new()
            .route("/health.v1.Health/Check", get(check_handler))
            .route("/health.v1.Health/Watch", get(watch_handler))
            .with_state(self.probe.clone())
    }

    /// The `tonic-health` gRPC service sharing the same probe, sampled
    /// into `tonic_health`'s own reporter on an interval matching
    /// [`WATCH_INTERVAL`].
    #[cfg(feature = "tonic")]
    pub fn grpc_service(
        &self,
        service_name: impl Into<String>,
    ) -> tonic_health::pb::health_server::HealthServer<tonic_health::server::HealthService> {
        let (reporter, service) = tonic_health::server::health_reporter();
        let probe = self.probe.clone();
        let service_name = service_name.into();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(WATCH_INTERVAL);
            loop {
                interval.tick().await;
                let status = match probe.check(&service_name).await {
                    Ok(()) => tonic_health::ServingStatus::Serving,
                    Err(_) => tonic_health::ServingStatus::NotServing,
                };
                reporter.set_service_status(&service_name, status).await;
            }
        });
        service
    }
}

async fn check_handler(
    State(probe): State<Arc<dyn HealthProbe>>,
    Query(query): Query<HealthQuery>,
) -> Json<CheckResponse> {
    let result = probe.check(&query.service).await;
    Json(CheckResponse { status: ServingStatus::from_probe_result(&result) })
}

/// Streams newline-delimited JSON `CheckResponse` frames: one immediately,
/// then one every time the probe's status changes on the 60s tick. The
/// connection closing (client cancellation) drops the stream and ends the
/// loop.
async fn watch_handler(
    State(probe): State<Arc<dyn HealthProbe>>,
    Query(query): Query<HealthQuery>,
) -> Response {
    let stream = async_stream::stream! {
        let mut last = None;
        loop {
            let result = probe.check(&query.service).await;
            let status = ServingStatus::from_probe_result(&result);
            if last != Some(status) {
                last = Some(status);
                let payload = CheckResponse { status };
                let mut line = serde_json::to_vec(&payload).unwrap_or_default();
                line.push(b'\n');
                yield Ok::<_, std::io::Error>(bytes::Bytes::from(line));
            }
            tokio::time::sleep(WATCH_INTERVAL).await;
        }
    };

    Response::builder()
        .header(CONTENT_TYPE, "application/x-ndjson")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| Response::new(Body::empty()))
        .into_response()
}
