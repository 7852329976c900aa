//! gatelink-client: Rust client library for gatelink tunnels.
//!
//! A [`Tunnel`] opens a WebSocket control channel to a connection gateway,
//! asks it to reach a TCP target, and then relays raw bytes in both
//! directions. Writes issued before the gateway confirms the target are
//! buffered and flushed in one send once the tunnel is up.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use gatelink_client::{StaticGateway, Target, TunnelEvent, TunnelRegistry, TunnelSettings};
//!
//! # async fn example() -> gatelink_core::TunnelResult<()> {
//! let registry = TunnelRegistry::with_websocket(
//!     TunnelSettings::with_token("secret"),
//!     Arc::new(StaticGateway::new("wss://gateway.example.com/connect")),
//! );
//!
//! let tunnel = registry.create_tunnel();
//! let mut events = tunnel.events().expect("fresh tunnel");
//! tunnel.write(b"SSH-2.0-client\r\n");
//! tunnel.open(Target::new("10.0.0.5", 22)).await?;
//!
//! while let Some(event) = events.recv().await {
//!     if let TunnelEvent::Data(bytes) = event {
//!         println!("{}", String::from_utf8_lossy(&bytes));
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config_store;
pub mod gateway;
pub mod registry;
pub mod settings;
pub mod transport;
pub mod tunnel;

// Re-export primary public types.
pub use config_store::{ConfigBackend, ConfigError, ConfigRecord, ConfigStore, HttpConfigBackend};
pub use gateway::{Gateway, GatewayResolver, HttpGatewayResolver, StaticGateway};
pub use registry::TunnelRegistry;
pub use settings::TunnelSettings;
pub use transport::WebSocketConnector;
pub use tunnel::{Target, Tunnel, TunnelEvent, TunnelId};

// Re-export gatelink-core error types for convenience.
pub use gatelink_core::{TunnelError, TunnelResult, TunnelState};
