//! Terrain generator contract.
//!
//! A generator fills a new chunk's storage through [`GeneratingChunk`],
//! which only offers a side-effect free write path: generation never
//! notifies or re-meshes other chunks.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use webcraft_proto::packets::ModifyEntry;
use webcraft_proto::types::{BlockPos, ChunkAddr, Vec3};

use crate::block_registry::{BlockRegistry, AIR_ID};
use crate::coords::{ChunkSize, LocalPos};
use crate::error::WorldError;
use crate::extra_data::ExtraData;
use crate::flat_generator::FlatGenerator;
use crate::typed_blocks::{BlockInstance, TypedBlocks};

/// Per-chunk data a generator reports alongside the blocks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapMetadata {
    pub generator: String,
    /// Highest non-air world y in the chunk, if any.
    pub max_height: Option<i32>,
}

/// Chunk being filled by a generator.
pub struct GeneratingChunk<'a> {
    pub addr: ChunkAddr,
    /// World position of the chunk's minimum corner.
    pub coord: BlockPos,
    pub size: ChunkSize,
    blocks: &'a mut TypedBlocks,
}

impl<'a> GeneratingChunk<'a> {
    pub fn new(addr: ChunkAddr, blocks: &'a mut TypedBlocks) -> Self {
        let size = blocks.size();
        Self {
            addr,
            coord: size.origin(addr),
            size,
            blocks,
        }
    }

    /// Write a cell by local coordinate. Out-of-range writes are ignored.
    pub fn set_block_indirect(
        &mut self,
        x: i32,
        y: i32,
        z: i32,
        block_id: u32,
        rotate: Option<Vec3>,
        extra_data: Option<ExtraData>,
    ) {
        let l = LocalPos::new(x, y, z);
        if self.size.contains(l) {
            self.blocks.set_indirect(l, block_id, rotate, extra_data);
        }
    }

    pub fn block_id(&self, x: i32, y: i32, z: i32) -> u32 {
        let l = LocalPos::new(x, y, z);
        if self.size.contains(l) {
            self.blocks.id_at(l)
        } else {
            AIR_ID
        }
    }
}

/// Pluggable terrain algorithm. Must be callable from worker threads.
pub trait TerrainGenerator: Send + Sync {
    fn id(&self) -> &str;
    fn generate(&self, chunk: &mut GeneratingChunk<'_>) -> MapMetadata;
}

/// Leaves every chunk empty.
pub struct EmptyGenerator;

impl TerrainGenerator for EmptyGenerator {
    fn id(&self) -> &str {
        "empty"
    }

    fn generate(&self, _chunk: &mut GeneratingChunk<'_>) -> MapMetadata {
        MapMetadata {
            generator: self.id().to_string(),
            max_height: None,
        }
    }
}

/// Generator by configured id.
pub fn create_generator(
    id: &str,
    registry: &BlockRegistry,
) -> Result<Arc<dyn TerrainGenerator>, WorldError> {
    match id {
        "flat" => Ok(Arc::new(FlatGenerator::new(registry))),
        "empty" => Ok(Arc::new(EmptyGenerator)),
        other => Err(WorldError::UnknownGenerator(other.to_string())),
    }
}

/// Allocate storage for `addr` and run the generator on it.
pub fn generate_chunk(
    generator: &dyn TerrainGenerator,
    addr: ChunkAddr,
    size: ChunkSize,
) -> (TypedBlocks, MapMetadata) {
    let mut blocks = TypedBlocks::new(size);
    let map = {
        let mut chunk = GeneratingChunk::new(addr, &mut blocks);
        generator.generate(&mut chunk)
    };
    (blocks, map)
}

/// Replay persisted edits on top of generated terrain, in order.
///
/// Entries outside the chunk, unknown ids and placements with zero power
/// are skipped; id 0 clears the cell.
pub fn apply_modify_list(
    blocks: &mut TypedBlocks,
    addr: ChunkAddr,
    list: &[ModifyEntry],
    registry: &BlockRegistry,
) -> usize {
    let size = blocks.size();
    let origin = size.origin(addr);
    let mut applied = 0;
    for entry in list {
        let Some(l) = size.local_checked(entry.pos, origin) else {
            debug!("modify entry {} is outside chunk {addr}", entry.pos);
            continue;
        };
        if entry.item.id == AIR_ID {
            blocks.delete(l);
            applied += 1;
            continue;
        }
        let Some(block) = registry.get(entry.item.id) else {
            debug!("modify entry with unknown block id {} skipped", entry.item.id);
            continue;
        };
        if let Some(inst) = BlockInstance::from_item(&entry.item, block.extra_data_schema) {
            blocks.set(l, inst);
            applied += 1;
        }
    }
    applied
}
