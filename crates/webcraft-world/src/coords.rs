//! Mapping between world coordinates, chunk addresses and chunk-local cells.

use serde::{Deserialize, Serialize};

use webcraft_proto::types::{BlockPos, ChunkAddr, Vec3};

pub const CHUNK_SIZE_X: i32 = 16;
pub const CHUNK_SIZE_Y: i32 = 40;
pub const CHUNK_SIZE_Z: i32 = 16;

/// Largest absolute coordinate an entity may occupy on any axis.
pub const WORLD_LIMIT: f32 = 30_000_000.0;

/// `true` if the position is finite and inside [`WORLD_LIMIT`].
pub fn in_world(pos: &Vec3) -> bool {
    pos.is_finite()
        && pos.x.abs() <= WORLD_LIMIT
        && pos.y.abs() <= WORLD_LIMIT
        && pos.z.abs() <= WORLD_LIMIT
}

/// A cell position inside one chunk. Always within `[0, size)` on every axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl LocalPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

/// Chunk dimensions in blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSize {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Default for ChunkSize {
    fn default() -> Self {
        Self {
            x: CHUNK_SIZE_X,
            y: CHUNK_SIZE_Y,
            z: CHUNK_SIZE_Z,
        }
    }
}

impl ChunkSize {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        debug_assert!(x > 0 && y > 0 && z > 0);
        Self { x, y, z }
    }

    /// Number of cells in one chunk.
    pub fn volume(&self) -> usize {
        (self.x * self.y * self.z) as usize
    }

    /// Address of the chunk containing a block. Floor division per axis.
    pub fn chunk_addr(&self, pos: BlockPos) -> ChunkAddr {
        ChunkAddr::new(
            pos.x.div_euclid(self.x),
            pos.y.div_euclid(self.y),
            pos.z.div_euclid(self.z),
        )
    }

    /// Address of the chunk containing a floating point position.
    ///
    /// Returns `None` for NaN, infinite or out-of-world input. `-0.0` lands
    /// in the same chunk as `0.0`.
    pub fn chunk_addr_of(&self, pos: Vec3) -> Option<ChunkAddr> {
        if !in_world(&pos) {
            return None;
        }
        Some(self.chunk_addr(BlockPos::from_vec3(&pos)))
    }

    /// World position of the chunk's minimum corner. `addr` must be
    /// [`ChunkSize::addr_in_range`].
    pub fn origin(&self, addr: ChunkAddr) -> BlockPos {
        BlockPos::new(addr.x * self.x, addr.y * self.y, addr.z * self.z)
    }

    /// `true` if every block of the chunk at `addr`, plus a one-block margin
    /// on each side, has an `i32` position.
    pub fn addr_in_range(&self, addr: ChunkAddr) -> bool {
        let fits = |a: i32, s: i32| {
            a.checked_mul(s)
                .is_some_and(|o| o.checked_sub(1).is_some() && o.checked_add(s).is_some())
        };
        fits(addr.x, self.x) && fits(addr.y, self.y) && fits(addr.z, self.z)
    }

    /// Chunk-local cell for a world position, wrapping into `[0, size)`.
    ///
    /// Positions outside the chunk at `origin` wrap around, which is what
    /// neighbor-margin lookups rely on.
    pub fn local(&self, pos: BlockPos, origin: BlockPos) -> LocalPos {
        LocalPos::new(
            (pos.x - origin.x).rem_euclid(self.x),
            (pos.y - origin.y).rem_euclid(self.y),
            (pos.z - origin.z).rem_euclid(self.z),
        )
    }

    /// Local offset without wrapping; `None` if outside the chunk.
    pub fn local_checked(&self, pos: BlockPos, origin: BlockPos) -> Option<LocalPos> {
        let l = LocalPos::new(pos.x - origin.x, pos.y - origin.y, pos.z - origin.z);
        self.contains(l).then_some(l)
    }

    pub fn contains(&self, l: LocalPos) -> bool {
        (0..self.x).contains(&l.x) && (0..self.y).contains(&l.y) && (0..self.z).contains(&l.z)
    }

    /// Flat array offset: `(SX * SZ) * y + z * SX + x`.
    pub fn flatten(&self, l: LocalPos) -> usize {
        ((self.x * self.z) * l.y + l.z * self.x + l.x) as usize
    }

    pub fn unflatten(&self, index: usize) -> LocalPos {
        let index = index as i32;
        let layer = self.x * self.z;
        let y = index / layer;
        let rem = index % layer;
        LocalPos::new(rem % self.x, y, rem / self.x)
    }

    /// World position of a local cell in the chunk at `addr`.
    pub fn world_pos(&self, addr: ChunkAddr, l: LocalPos) -> BlockPos {
        self.origin(addr).offset(l.x, l.y, l.z)
    }
}
