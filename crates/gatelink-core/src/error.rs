use thiserror::Error;

use crate::state::TunnelState;

/// Errors produced by a tunnel over its lifetime.
///
/// Cloneable because the same failure is delivered both on the tunnel's
/// event stream and as the result of a pending `open()`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TunnelError {
    #[error("gateway resolution failed: {0}")]
    GatewayResolution(String),

    #[error("gateway error: {0}")]
    Protocol(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("handshake timed out while {0}")]
    HandshakeTimeout(TunnelState),

    #[error("pending write buffer exceeded {limit} bytes")]
    BufferOverflow { limit: usize },

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("tunnel cannot be opened while {0}")]
    InvalidState(TunnelState),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("tunnel closed")]
    Closed,
}

impl From<serde_json::Error> for TunnelError {
    fn from(e: serde_json::Error) -> Self {
        TunnelError::Codec(e.to_string())
    }
}

pub type TunnelResult<T> = Result<T, TunnelError>;
