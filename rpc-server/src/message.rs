//! Message types for Connect RPC request and response handling.

pub mod error;
mod request;
mod response;

pub use request::{ConnectRequest, RequestPipeline, Streaming, get_context_or_default};
pub use response::{ConnectResponse, ResponsePipeline, StreamBody};
