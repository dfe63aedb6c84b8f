//! Session packets: connect handshake, keepalive and error reporting.

use serde::{Deserialize, Serialize};

use crate::codec::GamePacket;
use crate::packets::id;

/// Connect (34): Client → Server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connect {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl GamePacket for Connect {
    const ID: u32 = id::CONNECT;
}

/// Connected (62): Server → Client, answer to [`Connect`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connected {
    pub player_id: u64,
    pub world_guid: String,
    pub chunk_render_dist: i32,
}

impl GamePacket for Connected {
    const ID: u32 = id::CONNECTED;
}

/// Error (7): Server → Client, human readable failure of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub message: String,
}

impl GamePacket for ErrorMessage {
    const ID: u32 = id::ERROR;
}

/// Ping (3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ping;

impl GamePacket for Ping {
    const ID: u32 = id::PING;
}

/// Pong (4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pong;

impl GamePacket for Pong {
    const ID: u32 = id::PONG;
}
