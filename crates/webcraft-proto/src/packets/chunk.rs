//! Chunk lifecycle packets: load requests, modify lists, snapshots and
//! nearby-set updates.

use serde::{Deserialize, Serialize};

use crate::codec::GamePacket;
use crate::packets::block::BlockItem;
use crate::packets::id;
use crate::types::{BlockPos, ChunkAddr};

/// ChunkLoad (37): Client → Server, request the persisted state of a chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkLoad {
    pub pos: ChunkAddr,
}

impl GamePacket for ChunkLoad {
    const ID: u32 = id::CHUNK_LOAD;
}

/// One persisted edit inside a chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifyEntry {
    pub pos: BlockPos,
    pub item: BlockItem,
}

/// ChunkLoaded (39): Server → Client, ordered list of edits to replay on top
/// of generated terrain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkLoaded {
    pub addr: ChunkAddr,
    #[serde(default)]
    pub modify_list: Vec<ModifyEntry>,
}

impl GamePacket for ChunkLoaded {
    const ID: u32 = id::CHUNK_LOADED;
}

/// ChunkSnapshot (38): Server → Client, full cell state for initial load.
/// `data` is a packed (deflate + base64) JSON storage snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkSnapshot {
    pub addr: ChunkAddr,
    pub data: String,
}

impl GamePacket for ChunkSnapshot {
    const ID: u32 = id::CHUNK_SNAPSHOT;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyChunk {
    pub addr: ChunkAddr,
    /// The client should expect a [`ChunkLoaded`] with edits for this chunk.
    pub has_modifiers: bool,
}

/// NearbyChunks (67): Server → Client. Applied as one unit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NearbyChunks {
    pub chunk_render_dist: i32,
    #[serde(default)]
    pub added: Vec<NearbyChunk>,
    #[serde(default)]
    pub deleted: Vec<ChunkAddr>,
}

impl NearbyChunks {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty()
    }
}

impl GamePacket for NearbyChunks {
    const ID: u32 = id::NEARBY_CHUNKS;
}
