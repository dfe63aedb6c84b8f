//! Player packets: movement, render distance, presence.

use serde::{Deserialize, Serialize};

use crate::codec::GamePacket;
use crate::packets::id;
use crate::types::Vec3;

/// PlayerState (43): Client → Server position update, relayed to others.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub pos: Vec3,
    #[serde(default)]
    pub rotate: Vec3,
}

impl GamePacket for PlayerState {
    const ID: u32 = id::PLAYER_STATE;
}

/// ChangeRenderDist (10): Client → Server. Payload is the bare integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRenderDist(pub i32);

impl GamePacket for ChangeRenderDist {
    const ID: u32 = id::CHANGE_RENDER_DIST;
}

/// InventoryNewState (90): Client → Server. The inventory is opaque here
/// and stored as sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryNewState(pub serde_json::Value);

impl GamePacket for InventoryNewState {
    const ID: u32 = id::INVENTORY_NEW_STATE;
}

/// InventoryState (66): Server → Client. Stored inventory, sent on join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryState(pub serde_json::Value);

impl GamePacket for InventoryState {
    const ID: u32 = id::INVENTORY_STATE;
}

/// PlayerJoin (41): Server → Client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerJoin {
    pub id: u64,
    pub username: String,
    pub pos: Vec3,
}

impl GamePacket for PlayerJoin {
    const ID: u32 = id::PLAYER_JOIN;
}

/// PlayerLeave (42): Server → Client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerLeave {
    pub id: u64,
}

impl GamePacket for PlayerLeave {
    const ID: u32 = id::PLAYER_LEAVE;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Packet;

    #[test]
    fn render_dist_is_bare_number() {
        let pkt = Packet::new(&ChangeRenderDist(5)).unwrap();
        assert_eq!(pkt.data, serde_json::json!(5));
    }

    #[test]
    fn player_state_rotate_optional() {
        let pkt = Packet::raw(
            id::PLAYER_STATE,
            serde_json::json!({"pos": {"x": 1.0, "y": 2.0, "z": 3.0}}),
        );
        let s = pkt.decode::<PlayerState>().unwrap();
        assert_eq!(s.rotate, Vec3::ZERO);
    }
}
