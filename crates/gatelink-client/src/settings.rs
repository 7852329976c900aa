//! Per-registry tunnel settings.

use std::time::Duration;

/// Default cap on bytes buffered before a tunnel opens.
pub const DEFAULT_MAX_PENDING_BYTES: usize = 4 * 1024 * 1024;

/// Default time allowed between channel connect and `connected`.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings shared by every tunnel a registry creates.
#[derive(Debug, Clone)]
pub struct TunnelSettings {
    /// Token sent in the `hello` reply.
    pub auth_token: String,
    /// Gateway URL to use instead of asking the resolver.
    pub custom_gateway: Option<String>,
    /// How long the handshake may take (zero = no limit).
    pub handshake_timeout: Duration,
    /// Upper bound for the pre-open write buffer (`None` = unbounded).
    pub max_pending_bytes: Option<usize>,
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            auth_token: String::new(),
            custom_gateway: None,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            max_pending_bytes: Some(DEFAULT_MAX_PENDING_BYTES),
        }
    }
}

impl TunnelSettings {
    /// Default settings with the given auth token.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            auth_token: token.into(),
            ..Default::default()
        }
    }

    /// Use a fixed gateway URL, bypassing gateway resolution.
    pub fn custom_gateway(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.custom_gateway = if url.is_empty() { None } else { Some(url) };
        self
    }
}
