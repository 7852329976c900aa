//! Control messages exchanged with a connection gateway.
//!
//! Every control message is a JSON object whose `"_"` field names its kind.
//! They travel in text frames; binary frames carry tunnel payload.

use serde::{Deserialize, Serialize};

/// Version sent in the client's `hello` reply.
pub const PROTOCOL_VERSION: u32 = 1;

/// Messages the gateway sends to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Greeting sent right after the channel opens.
    Hello {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<u32>,
    },
    /// The gateway accepted the client's hello and waits for a target.
    Ready,
    /// The gateway reached the target; payload may flow.
    Connected,
    /// The gateway gave up on this tunnel.
    Error {
        #[serde(default)]
        details: String,
    },
    /// Any kind this client does not know about.
    #[serde(other)]
    Unknown,
}

/// Messages the client sends to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_", rename_all = "snake_case")]
pub enum ClientMessage {
    Hello { version: u32, auth_token: String },
    Connect { host: String, port: u16 },
}

impl ClientMessage {
    /// Build the `hello` reply carrying the client's auth token.
    pub fn hello(auth_token: impl Into<String>) -> Self {
        Self::Hello {
            version: PROTOCOL_VERSION,
            auth_token: auth_token.into(),
        }
    }

    /// Build the `connect` request for a target.
    pub fn connect(host: impl Into<String>, port: u16) -> Self {
        Self::Connect {
            host: host.into(),
            port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_hello_wire_shape() {
        let value = serde_json::to_value(ClientMessage::hello("tok")).unwrap();
        assert_eq!(value, json!({"_": "hello", "version": 1, "auth_token": "tok"}));
    }

    #[test]
    fn client_connect_wire_shape() {
        let value = serde_json::to_value(ClientMessage::connect("db.internal", 5432)).unwrap();
        assert_eq!(value, json!({"_": "connect", "host": "db.internal", "port": 5432}));
    }

    #[test]
    fn server_hello_without_fields() {
        let msg: ServerMessage = serde_json::from_str(r#"{"_":"hello"}"#).unwrap();
        assert_eq!(msg, ServerMessage::Hello { version: None });
    }

    #[test]
    fn server_hello_with_version() {
        let msg: ServerMessage = serde_json::from_str(r#"{"_":"hello","version":1}"#).unwrap();
        assert_eq!(msg, ServerMessage::Hello { version: Some(1) });
    }

    #[test]
    fn server_error_details() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"_":"error","details":"boom"}"#).unwrap();
        assert_eq!(
            msg,
            ServerMessage::Error {
                details: "boom".into()
            }
        );
    }

    #[test]
    fn unknown_kind_is_tolerated() {
        let msg: ServerMessage = serde_json::from_str(r#"{"_":"ping"}"#).unwrap();
        assert_eq!(msg, ServerMessage::Unknown);
    }

    #[test]
    fn missing_discriminator_is_rejected() {
        assert!(serde_json::from_str::<ServerMessage>(r#"{"kind":"hello"}"#).is_err());
    }
}
