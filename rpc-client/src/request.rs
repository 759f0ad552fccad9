//! Request-side types for Connect RPC client calls.

pub use crate::frame::FrameEncoder;
