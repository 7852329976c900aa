//! Client configuration at `~/.gatelink/config.toml`.
//!
//! Holds the gateway settings used to build tunnels. CLI flags always
//! override config file values.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use gatelink_client::TunnelSettings;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// `[gateway]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Fixed gateway URL (empty = ask the API).
    #[serde(default)]
    pub url: String,

    /// Account API base URL used to choose a gateway.
    #[serde(default)]
    pub api_base: String,

    /// Token sent to the gateway in the hello reply.
    #[serde(default)]
    pub auth_token: String,

    /// Handshake timeout in seconds (0 = none).
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,

    /// Cap on bytes buffered before a tunnel opens (0 = unbounded).
    #[serde(default = "default_max_pending")]
    pub max_pending_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_base: String::new(),
            auth_token: String::new(),
            handshake_timeout_secs: default_handshake_timeout(),
            max_pending_bytes: default_max_pending(),
        }
    }
}

fn default_handshake_timeout() -> u64 {
    30
}

fn default_max_pending() -> usize {
    gatelink_client::settings::DEFAULT_MAX_PENDING_BYTES
}

impl Config {
    /// Load configuration from a TOML file, returning defaults if the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;

        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Save the configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("failed to serialize config")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("failed to write config to {}", path.display()))?;

        Ok(())
    }

    /// Apply CLI flag overrides on top of file values.
    pub fn apply_overrides(
        &mut self,
        gateway: Option<String>,
        api_base: Option<String>,
        auth_token: Option<String>,
    ) {
        if let Some(url) = gateway {
            self.gateway.url = url;
        }
        if let Some(api) = api_base {
            self.gateway.api_base = api;
        }
        if let Some(token) = auth_token {
            self.gateway.auth_token = token;
        }
    }

    /// Tunnel settings described by this config.
    pub fn tunnel_settings(&self) -> TunnelSettings {
        TunnelSettings {
            auth_token: self.gateway.auth_token.clone(),
            custom_gateway: None,
            handshake_timeout: Duration::from_secs(self.gateway.handshake_timeout_secs),
            max_pending_bytes: match self.gateway.max_pending_bytes {
                0 => None,
                n => Some(n),
            },
        }
        .custom_gateway(self.gateway.url.clone())
    }

    /// Copy for display, with the auth token masked.
    pub fn redacted(&self) -> Self {
        let mut shown = self.clone();
        if !shown.gateway.auth_token.is_empty() {
            shown.gateway.auth_token = REDACTED.to_string();
        }
        shown
    }
}

/// Shown in place of the auth token when printing the config.
pub const REDACTED: &str = "<redacted>";

/// `~/.gatelink/config.toml`.
pub fn default_path() -> std::path::PathBuf {
    let home = dirs::home_dir().unwrap_or_default();
    home.join(".gatelink").join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = Config::default();
        assert!(cfg.gateway.url.is_empty());
        assert!(cfg.gateway.api_base.is_empty());
        assert_eq!(cfg.gateway.handshake_timeout_secs, 30);
        assert_eq!(cfg.gateway.max_pending_bytes, 4 * 1024 * 1024);
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[gateway]
url = "wss://gw.example.com/connect"
auth_token = "abc"
handshake_timeout_secs = 5
max_pending_bytes = 0
"#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        let settings = cfg.tunnel_settings();
        assert_eq!(settings.custom_gateway.as_deref(), Some("wss://gw.example.com/connect"));
        assert_eq!(settings.auth_token, "abc");
        assert_eq!(settings.handshake_timeout, Duration::from_secs(5));
        assert_eq!(settings.max_pending_bytes, None);
    }

    #[test]
    fn parse_partial_toml_config() {
        let cfg: Config = toml::from_str("[gateway]\napi_base = \"https://app.example.com\"\n").unwrap();
        assert_eq!(cfg.gateway.api_base, "https://app.example.com");
        assert_eq!(cfg.gateway.handshake_timeout_secs, 30); // default
        assert!(cfg.tunnel_settings().custom_gateway.is_none());
    }

    #[test]
    fn overrides_win() {
        let mut cfg = Config::default();
        cfg.gateway.auth_token = "file".into();
        cfg.apply_overrides(Some("ws://cli:1".into()), None, Some("cli".into()));
        assert_eq!(cfg.gateway.url, "ws://cli:1");
        assert_eq!(cfg.gateway.auth_token, "cli");
        assert!(cfg.gateway.api_base.is_empty());
    }

    #[test]
    fn redacted_masks_token_only() {
        let mut cfg = Config::default();
        cfg.gateway.auth_token = "s3cret".into();
        cfg.gateway.api_base = "https://app.example.com".into();

        let shown = cfg.redacted();
        assert_eq!(shown.gateway.auth_token, REDACTED);
        assert_eq!(shown.gateway.api_base, "https://app.example.com");
        assert_eq!(cfg.gateway.auth_token, "s3cret");

        assert!(Config::default().redacted().gateway.auth_token.is_empty());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config::default();
        cfg.gateway.api_base = "https://app.example.com".into();
        cfg.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.gateway.api_base, "https://app.example.com");
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert!(cfg.gateway.url.is_empty());
    }
}
