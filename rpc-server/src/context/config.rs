//! Protocol-layer configuration - server-wide static settings consumed by
//! [`crate::layer::ConnectLayer`].
//!
//! Distinct from the full server aggregate in [`crate::server::ServerConfig`]:
//! this is just the compression/limits/timeout/header-policy slice
//! `ConnectLayer` needs to build a [`super::ConnectContext`] per request.

use crate::context::{CompressionConfig, MessageLimits};
use std::time::Duration;

/// Server-wide configuration for the Connect RPC layer.
///
/// Set once at startup, immutable per-request.
/// Used by ConnectLayer to build Context.
#[derive(Debug, Clone, Copy)]
pub struct ProtocolConfig {
    /// Compression settings
    pub compression: CompressionConfig,
    /// Message size limits
    pub limits: MessageLimits,
    /// Server-side timeout (optional)
    pub server_timeout: Option<Duration>,
    /// Whether to require Connect-Protocol-Version header
    pub require_protocol_header: bool,
    /// Whether decoded messages implementing `Validatable` are checked
    /// after extraction.
    pub input_validation: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            compression: CompressionConfig::default(),
            limits: MessageLimits::default(),
            server_timeout: None,
            require_protocol_header: false,
            input_validation: true,
        }
    }
}

impl ProtocolConfig {
    /// Create a new server config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the compression configuration.
    pub fn with_compression(mut self, config: CompressionConfig) -> Self {
        self.compression = config;
        self
    }

    /// Set the message size limits.
    pub fn with_limits(mut self, limits: MessageLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the server-side timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.server_timeout = Some(timeout);
        self
    }

    /// Require the Connect-Protocol-Version header.
    pub fn require_protocol_header(mut self) -> Self {
        self.require_protocol_header = true;
        self
    }

    /// Enable or disable `Validatable` enforcement on decoded messages.
    pub fn with_input_validation(mut self, enabled: bool) -> Self {
        self.input_validation = enabled;
        self
    }
}
