//! Block delta packets.

use serde::{Deserialize, Serialize};

use crate::codec::GamePacket;
use crate::packets::id;
use crate::types::{BlockPos, Vec3};

/// The value placed into a cell. Absent fields take block defaults on the
/// receiving side (power 100, rotate zero).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BlockItem {
    pub id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotate: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
}

impl BlockItem {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn air() -> Self {
        Self::new(0)
    }
}

/// BlockSet (36): bidirectional single-cell delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSet {
    pub pos: BlockPos,
    pub item: BlockItem,
    /// Player-made change (as opposed to a server-side procedural write).
    #[serde(default)]
    pub is_modify: bool,
}

impl GamePacket for BlockSet {
    const ID: u32 = id::BLOCK_SET;
}

/// BlockDestroy (35): Client → Server request to clear a cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDestroy {
    pub pos: BlockPos,
}

impl GamePacket for BlockDestroy {
    const ID: u32 = id::BLOCK_DESTROY;
}
