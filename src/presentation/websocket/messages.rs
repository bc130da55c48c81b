//! WebSocket Message Types
//!
//! Gateway frames are `{op, d, s, t}` objects.

use serde::{Deserialize, Serialize};

use crate::application::dto::UserResponse;

/// Gateway opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// Event dispatch
    Dispatch = 0,
    /// Heartbeat
    Heartbeat = 1,
    /// Identify
    Identify = 2,
    /// Send a chat message
    SendMessage = 5,
    /// Invalid session
    InvalidSession = 9,
    /// Hello
    Hello = 10,
    /// Heartbeat ACK
    HeartbeatAck = 11,
}

impl OpCode {
    pub fn from_u64(op: u64) -> Option<Self> {
        match op {
            0 => Some(OpCode::Dispatch),
            1 => Some(OpCode::Heartbeat),
            2 => Some(OpCode::Identify),
            5 => Some(OpCode::SendMessage),
            9 => Some(OpCode::InvalidSession),
            10 => Some(OpCode::Hello),
            11 => Some(OpCode::HeartbeatAck),
            _ => None,
        }
    }
}

/// Incoming gateway message
#[derive(Debug, Deserialize)]
pub struct GatewayReceive {
    pub op: u64,
    #[serde(default)]
    pub d: Option<serde_json::Value>,
    #[serde(default)]
    pub s: Option<u64>,
    #[serde(default)]
    pub t: Option<String>,
}

/// Outgoing gateway message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewaySend {
    pub op: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl GatewaySend {
    /// Control frame without an event name.
    pub fn control(op: OpCode, d: Option<serde_json::Value>) -> Self {
        Self {
            op: op as u8,
            d,
            s: None,
            t: None,
        }
    }

    /// Dispatch frame; the connection's writer assigns the sequence number.
    pub fn dispatch(event: &str, d: serde_json::Value) -> Self {
        Self {
            op: OpCode::Dispatch as u8,
            d: Some(d),
            s: None,
            t: Some(event.to_string()),
        }
    }

    pub fn invalid_session() -> Self {
        Self::control(OpCode::InvalidSession, Some(serde_json::Value::Bool(false)))
    }

    pub fn is_dispatch(&self) -> bool {
        self.op == OpCode::Dispatch as u8
    }
}

/// Hello payload (op 10)
#[derive(Debug, Serialize)]
pub struct HelloPayload {
    pub heartbeat_interval: u64,
}

/// Ready payload (dispatch READY)
#[derive(Debug, Serialize)]
pub struct ReadyPayload {
    pub session_id: String,
    pub user: UserResponse,
    pub rooms: Vec<String>,
}

/// Identify payload (op 2)
#[derive(Debug, Deserialize)]
pub struct IdentifyPayload {
    pub token: String,
}

/// Send message payload (op 5)
#[derive(Debug, Deserialize)]
pub struct SendMessagePayload {
    pub receiver_id: i64,
    pub content: String,
}

/// MESSAGE_FAILED dispatch payload
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageFailedPayload {
    pub reason: String,
}

/// PRESENCE_UPDATE dispatch payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresencePayload {
    pub user_id: String,
    pub status: PresenceStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}
