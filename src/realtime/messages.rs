//! Wire messages for the realtime protocol
//!
//! Outbound frames are small tagged JSON objects; inbound frames are
//! decoded exactly once at the transport boundary into `ServerMessage`,
//! with an explicit `Unrecognized` variant instead of silent drops.

use serde::Serialize;
use serde_json::Value;

/// Messages the session sends to the server
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Authenticate {
        #[serde(skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        mode: Option<String>,
    },
    Subscribe {
        channel: String,
    },
    Unsubscribe {
        channel: String,
    },
}

impl ClientMessage {
    /// Authenticate with a credential, or request public (anonymous) mode
    pub fn authenticate(credential: Option<&str>) -> Self {
        match credential {
            Some(token) => ClientMessage::Authenticate {
                token: Some(token.to_string()),
                mode: None,
            },
            None => ClientMessage::Authenticate {
                token: None,
                mode: Some("public".to_string()),
            },
        }
    }

    pub fn subscribe(channel: &str) -> Self {
        ClientMessage::Subscribe {
            channel: channel.to_string(),
        }
    }

    pub fn unsubscribe(channel: &str) -> Self {
        ClientMessage::Unsubscribe {
            channel: channel.to_string(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Representation safe for diagnostics: credentials never appear in
    /// plaintext in the message history.
    pub fn redacted(&self) -> String {
        match self {
            ClientMessage::Authenticate {
                token: Some(_), ..
            } => r#"{"type":"authenticate","token":"<redacted>"}"#.to_string(),
            other => other
                .to_json()
                .unwrap_or_else(|_| "<unserializable>".to_string()),
        }
    }
}

/// Authentication outcome reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Success,
    Failure,
}

/// Messages the server sends to the session, classified by `type` field
#[derive(Debug, Clone)]
pub enum ServerMessage {
    AuthResponse {
        status: AuthStatus,
        message: Option<String>,
        available_channels: Option<Vec<String>>,
    },
    ConnectionEstablished {
        message: Option<String>,
        version: Option<String>,
        available_channels: Option<Vec<String>>,
    },
    /// Anything with a `channel` field is routed to that channel's
    /// subscribers with the full payload
    Channel { channel: String, payload: Value },
    Unrecognized(Value),
}

impl ServerMessage {
    /// Decode a raw text frame. Parse errors propagate so the caller can
    /// log and drop the single malformed message.
    pub fn decode(text: &str) -> serde_json::Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Ok(Self::classify(value))
    }

    fn classify(value: Value) -> Self {
        match value.get("type").and_then(Value::as_str) {
            Some("auth_response") => {
                let status = match value.get("status").and_then(Value::as_str) {
                    Some("success") => AuthStatus::Success,
                    _ => AuthStatus::Failure,
                };
                ServerMessage::AuthResponse {
                    status,
                    message: string_field(&value, "message"),
                    available_channels: channel_list(&value),
                }
            }
            Some("connection_established") => ServerMessage::ConnectionEstablished {
                message: string_field(&value, "message"),
                version: string_field(&value, "version"),
                available_channels: channel_list(&value),
            },
            _ => match value.get("channel").and_then(Value::as_str) {
                Some(channel) => ServerMessage::Channel {
                    channel: channel.to_string(),
                    payload: value,
                },
                None => ServerMessage::Unrecognized(value),
            },
        }
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(String::from)
}

fn channel_list(value: &Value) -> Option<Vec<String>> {
    value.get("available_channels")?.as_array().map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect()
    })
}

/// Human-readable explanation for a WebSocket close code, recorded in
/// diagnostics alongside the raw code.
pub fn close_code_description(code: u16) -> &'static str {
    match code {
        1000 => "normal closure",
        1001 => "going away",
        1002 => "protocol error",
        1003 => "unsupported data",
        1005 => "no status received",
        1006 => "abnormal closure (no close frame)",
        1008 => "policy violation",
        1009 => "message too big",
        1011 => "internal server error",
        1012 => "service restart",
        1013 => "try again later",
        4003 => "authentication rejected",
        _ => "unknown close code",
    }
}
