//! Channel frame codec.
//!
//! The channel's own message boundaries are the framing: text frames hold a
//! single JSON control message, binary frames hold raw payload with no
//! length prefix or header.

use crate::error::TunnelResult;
use crate::messages::ServerMessage;

/// One message on the underlying channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A JSON control message.
    Text(String),
    /// Raw tunnel payload.
    Binary(Vec<u8>),
}

impl Frame {
    pub fn is_control(&self) -> bool {
        matches!(self, Frame::Text(_))
    }

    pub fn len(&self) -> usize {
        match self {
            Frame::Text(s) => s.len(),
            Frame::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Encode a control message into a text frame.
pub fn encode_control<T: serde::Serialize>(msg: &T) -> TunnelResult<Frame> {
    Ok(Frame::Text(serde_json::to_string(msg)?))
}

/// Decode the body of a text frame into a server control message.
pub fn decode_control(text: &str) -> TunnelResult<ServerMessage> {
    Ok(serde_json::from_str(text)?)
}
