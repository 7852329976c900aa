//! Channel transports for gatelink tunnels.
//!
//! Only WebSocket (`ws://` / `wss://`) gateways are supported.

pub mod websocket;

pub use websocket::WebSocketConnector;

use gatelink_core::{TunnelError, TunnelResult};

/// Check that a gateway URL uses a WebSocket scheme.
pub fn check_scheme(url: &str) -> TunnelResult<()> {
    let lower = url.to_lowercase();
    if lower.starts_with("ws://") || lower.starts_with("wss://") {
        Ok(())
    } else {
        Err(TunnelError::Transport(format!(
            "unsupported gateway URL scheme: {url} (expected ws:// or wss://)"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_websocket_urls() {
        assert!(check_scheme("ws://localhost:8080").is_ok());
        assert!(check_scheme("WSS://gateway.example.com/connect").is_ok());
    }

    #[test]
    fn rejects_other_schemes() {
        assert!(check_scheme("http://example.com").is_err());
        assert!(check_scheme("gateway.example.com").is_err());
    }
}
