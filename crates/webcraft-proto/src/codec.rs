//! Packet envelope encoding/decoding.
//!
//! Every packet on the wire is a JSON object `{"name": <command id>, "data": <payload>}`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ProtoError;

/// A packet with a typed payload.
pub trait GamePacket: Serialize + DeserializeOwned {
    /// Command id from [`crate::packets::id`].
    const ID: u32;
}

/// Wire envelope: numeric command id plus an untyped payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub name: u32,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Packet {
    /// Wrap a typed packet into an envelope.
    pub fn new<P: GamePacket>(packet: &P) -> Result<Self, ProtoError> {
        Ok(Self {
            name: P::ID,
            data: serde_json::to_value(packet)?,
        })
    }

    /// Envelope with an explicit id and raw payload.
    pub fn raw(name: u32, data: serde_json::Value) -> Self {
        Self { name, data }
    }

    pub fn is<P: GamePacket>(&self) -> bool {
        self.name == P::ID
    }

    /// Decode the payload as `P`. Fails if the id does not match.
    pub fn decode<P: GamePacket>(&self) -> Result<P, ProtoError> {
        if self.name != P::ID {
            return Err(ProtoError::InvalidData(format!(
                "expected packet {}, got {}",
                P::ID,
                self.name
            )));
        }
        Ok(P::deserialize(&self.data)?)
    }
}
