//! Light source map: per-cell light power numbers fed to the light worker.

use webcraft_proto::types::ChunkAddr;

use crate::block_registry::BlockRegistry;
use crate::coords::{ChunkSize, LocalPos};
use crate::typed_blocks::TypedBlocks;

/// Light power numbers for every cell of one chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct LightSourceMap {
    size: ChunkSize,
    data: Vec<u8>,
}

impl LightSourceMap {
    pub fn new(size: ChunkSize) -> Self {
        Self {
            size,
            data: vec![0; size.volume()],
        }
    }

    /// Compute the map from storage.
    pub fn from_blocks(blocks: &TypedBlocks, registry: &BlockRegistry) -> Self {
        let mut map = Self::new(blocks.size());
        map.recompute(blocks, registry);
        map
    }

    pub fn recompute(&mut self, blocks: &TypedBlocks, registry: &BlockRegistry) {
        for (index, slot) in self.data.iter_mut().enumerate() {
            *slot = light_number(registry, blocks.get_index(index).id());
        }
    }

    pub fn get(&self, l: LocalPos) -> u8 {
        self.data[self.size.flatten(l)]
    }

    /// Store a value; returns the flat index when it changed.
    pub fn set(&mut self, l: LocalPos, value: u8) -> Option<usize> {
        let index = self.size.flatten(l);
        if self.data[index] == value {
            return None;
        }
        self.data[index] = value;
        Some(index)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Light power number of a block id, clamped to a byte.
pub fn light_number(registry: &BlockRegistry, id: u32) -> u8 {
    registry
        .get(id)
        .map(|b| b.light_power_number.min(u8::MAX as u32) as u8)
        .unwrap_or(0)
}

/// Message for the external light worker.
#[derive(Debug, Clone, PartialEq)]
pub enum LightUpdate {
    /// Whole-chunk source map, sent after generation or a batched apply.
    Full { addr: ChunkAddr, data: Vec<u8> },
    /// Individual cells `(flat index, value)`.
    Cells {
        addr: ChunkAddr,
        changes: Vec<(u32, u8)>,
    },
    /// Chunks the light worker should forget.
    Destruct { addrs: Vec<ChunkAddr> },
}
