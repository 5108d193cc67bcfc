//! Wire shapes for the bidirectional extension channel.
//!
//! Unlike the local client socket, inbound extension messages are not
//! uniformly tagged: a raw command response has no `type` field at all, it
//! is recognized by shape (`id` + `success`). [`ExtensionInbound::parse`]
//! dispatches by shape instead of relying on a derived tagged enum.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::CommandResponse;

/// A command addressed to the extension, in its translated, envelope-free
/// shape: `{id, type, params?}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtensionCommand {
    pub id: String,
    #[serde(rename = "type")]
    pub command_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// The registration message an extension sends immediately after opening
/// its connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterMessage {
    pub window_id: u64,
    #[serde(default)]
    pub cached_session_id: Option<String>,
}

/// Messages the daemon sends to the extension outside of command dispatch.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtensionOutbound {
    Ping,
    Pong,
    #[serde(rename_all = "camelCase")]
    SessionAssigned { session_id: String },
}

/// The three shapes an inbound extension message can take.
#[derive(Debug, Clone)]
pub enum ExtensionInbound {
    Register(RegisterMessage),
    Ping,
    Pong,
    Response(CommandResponse),
    /// Recognized as a message but not one the dispatch logic understands;
    /// the caller logs and drops it.
    Unrecognized,
}

impl ExtensionInbound {
    /// Parse a raw JSON value received over the extension channel.
    ///
    /// A `{type: ...}` message is dispatched by its `type` field; the
    /// legacy `{type: "response", payload: {...}}` wrapper is unwrapped to
    /// its inner [`CommandResponse`]. Anything without a recognized `type`
    /// falls back to the raw-response shape (`id` + `success`).
    pub fn parse(raw: &Value) -> Self {
        if let Some(type_field) = raw.get("type").and_then(Value::as_str) {
            return match type_field {
                "register" => serde_json::from_value::<RegisterMessage>(raw.clone())
                    .map(Self::Register)
                    .unwrap_or(Self::Unrecognized),
                "ping" => Self::Ping,
                "pong" => Self::Pong,
                "response" => raw
                    .get("payload")
                    .and_then(|p| serde_json::from_value::<CommandResponse>(p.clone()).ok())
                    .map(Self::Response)
                    .unwrap_or(Self::Unrecognized),
                _ => Self::Unrecognized,
            };
        }

        match serde_json::from_value::<CommandResponse>(raw.clone()) {
            Ok(response) => Self::Response(response),
            Err(_) => Self::Unrecognized,
        }
    }
}

/// WebSocket-style close codes the channel server uses when tearing down
/// an extension connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    Normal,
    ProtocolError,
    NewConnectionForSession,
    HeartbeatTimeout,
}

impl CloseCode {
    pub fn code(self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::ProtocolError => 4000,
            Self::NewConnectionForSession => 4001,
            Self::HeartbeatTimeout => 4002,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Self::Normal => "server shutting down",
            Self::ProtocolError => "protocol error / not ready",
            Self::NewConnectionForSession => "new connection for session",
            Self::HeartbeatTimeout => "heartbeat timeout",
        }
    }
}
