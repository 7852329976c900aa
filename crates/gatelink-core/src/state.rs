//! Tunnel lifecycle states.

use std::fmt;

/// Where a tunnel is in its lifecycle.
///
/// States only move forward: `Idle` → `ResolvingGateway` → `Connecting` →
/// `AwaitingHello` → `AwaitingReady` → `AwaitingConnected` → `Relaying`,
/// with `Closed` reachable from any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TunnelState {
    Idle,
    ResolvingGateway,
    Connecting,
    AwaitingHello,
    AwaitingReady,
    AwaitingConnected,
    Relaying,
    Closed,
}

impl TunnelState {
    /// Whether writes issued in this state must be buffered.
    pub fn buffers_writes(self) -> bool {
        !matches!(self, Self::Relaying | Self::Closed)
    }

    /// Whether the handshake is still running (a channel exists but the
    /// tunnel is not yet relaying).
    pub fn is_handshaking(self) -> bool {
        matches!(
            self,
            Self::AwaitingHello | Self::AwaitingReady | Self::AwaitingConnected
        )
    }

    /// Whether the underlying channel is allowed to exist in this state.
    pub fn has_channel(self) -> bool {
        !matches!(self, Self::Idle | Self::ResolvingGateway | Self::Closed)
    }
}

impl fmt::Display for TunnelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::ResolvingGateway => "resolving gateway",
            Self::Connecting => "connecting",
            Self::AwaitingHello => "awaiting hello",
            Self::AwaitingReady => "awaiting ready",
            Self::AwaitingConnected => "awaiting connected",
            Self::Relaying => "relaying",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_relaying_and_closed_bypass_buffer() {
        assert!(TunnelState::Idle.buffers_writes());
        assert!(TunnelState::AwaitingConnected.buffers_writes());
        assert!(!TunnelState::Relaying.buffers_writes());
        assert!(!TunnelState::Closed.buffers_writes());
    }

    #[test]
    fn channel_presence() {
        assert!(!TunnelState::Idle.has_channel());
        assert!(!TunnelState::ResolvingGateway.has_channel());
        assert!(TunnelState::Connecting.has_channel());
        assert!(TunnelState::Relaying.has_channel());
        assert!(!TunnelState::Closed.has_channel());
    }

    #[test]
    fn display_is_human_readable() {
        assert_eq!(TunnelState::AwaitingReady.to_string(), "awaiting ready");
    }
}
