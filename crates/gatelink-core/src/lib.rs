//! gatelink-core: Shared protocol library for gatelink.
//!
//! Provides the JSON control message types exchanged with a connection
//! gateway, the text/binary frame codec, the tunnel state and error types,
//! and the abstract channel traits the client is built on.

pub mod codec;
pub mod error;
pub mod messages;
pub mod state;
pub mod transport;

// Re-export commonly used items at crate root.
pub use codec::{decode_control, encode_control, Frame};
pub use error::{TunnelError, TunnelResult};
pub use messages::{ClientMessage, ServerMessage, PROTOCOL_VERSION};
pub use state::TunnelState;
pub use transport::{ChannelHalves, Connector, Outbound};
