//! Game packet definitions.

pub mod block;
pub mod chunk;
pub mod player;
pub mod session;

pub use block::{BlockDestroy, BlockItem, BlockSet};
pub use chunk::{ChunkLoad, ChunkLoaded, ChunkSnapshot, ModifyEntry, NearbyChunk, NearbyChunks};
pub use player::{
    ChangeRenderDist, InventoryNewState, InventoryState, PlayerJoin, PlayerLeave, PlayerState,
};
pub use session::{Connect, Connected, ErrorMessage, Ping, Pong};

/// Command ids. Stable for a deployment: client and server must agree.
pub mod id {
    pub const HELLO: u32 = 1;
    pub const PING: u32 = 3;
    pub const PONG: u32 = 4;
    pub const ERROR: u32 = 7;
    pub const CHANGE_RENDER_DIST: u32 = 10;
    pub const CONNECT: u32 = 34;
    pub const BLOCK_DESTROY: u32 = 35;
    pub const BLOCK_SET: u32 = 36;
    pub const CHUNK_LOAD: u32 = 37;
    pub const CHUNK_SNAPSHOT: u32 = 38;
    pub const CHUNK_LOADED: u32 = 39;
    pub const PLAYER_JOIN: u32 = 41;
    pub const PLAYER_LEAVE: u32 = 42;
    pub const PLAYER_STATE: u32 = 43;
    pub const CONNECTED: u32 = 62;
    pub const INVENTORY_STATE: u32 = 66;
    pub const NEARBY_CHUNKS: u32 = 67;
    pub const INVENTORY_NEW_STATE: u32 = 90;
}
