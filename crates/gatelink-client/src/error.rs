//! Gateway client error types.

use gatelink_core::ErrorInfo;
use thiserror::Error;

/// Errors surfaced by the gateway client.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The OS random source or key import failed; no identity can be made.
    #[error("Crypto unavailable: {0}")]
    CryptoUnavailable(String),

    /// The gateway refused the `connect` request.
    #[error("Handshake rejected: {0}")]
    HandshakeRejected(ErrorInfo),

    /// A request outlived its deadline.
    #[error("Request {method} timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },

    /// The connection dropped while the request was outstanding.
    #[error("Disconnected: {0}")]
    Disconnected(String),

    /// Socket-level failure.
    #[error("Transport error: {0}")]
    TransportError(String),

    /// The gateway answered with `ok: false`.
    #[error("RPC error: {0}")]
    Rpc(ErrorInfo),

    /// A call was issued before the handshake completed.
    #[error("Not connected to gateway")]
    NotConnected,

    /// Identity storage or decoding failed.
    #[error("Identity error: {0}")]
    Identity(String),

    /// The client's driver task has shut down.
    #[error("Gateway client closed")]
    Closed,

    /// Encoding a frame failed.
    #[error("JSON error: {0}")]
    Json(String),
}

impl GatewayError {
    /// Server-supplied error, if this error came from the gateway.
    pub fn server_error(&self) -> Option<&ErrorInfo> {
        match self {
            Self::HandshakeRejected(info) | Self::Rpc(info) => Some(info),
            _ => None,
        }
    }

    /// True for failures the caller may simply retry after reconnecting.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Disconnected(_) | Self::NotConnected | Self::TransportError(_)
        )
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        Self::Identity(e.to_string())
    }
}
