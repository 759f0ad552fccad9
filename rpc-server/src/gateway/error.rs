//! Gateway-specific error type.

use thiserror::Error;

/// Errors surfaced by [`super::Gateway`] construction, connection, and
/// shutdown.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway is not connected to the RPC server")]
    NotConnected,

    #[error("failed to connect internal client: {0}")]
    Client(#[from] rpc_client::ClientBuildError),

    #[error("marshaling failed: {0}")]
    Marshal(String),

    #[error("gateway listener error: {0}")]
    Listener(#[source] std::io::Error),

    #[error("gateway shutdown error: {0}")]
    Shutdown(String),
}
