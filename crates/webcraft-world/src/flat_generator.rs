//! Flat world chunk generator.
//!
//! Layers in world y:
//! - Y = 0: Bedrock
//! - Y = 1-2: Dirt
//! - Y = 3: Grass
//! - Y = 4+: Air

use tracing::warn;

use crate::block_registry::BlockRegistry;
use crate::generator::{GeneratingChunk, MapMetadata, TerrainGenerator};

/// Resolved block ids of the flat layers. `None` when the pack lacks one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlatWorldBlocks {
    pub bedrock: Option<u32>,
    pub dirt: Option<u32>,
    pub grass: Option<u32>,
}

impl FlatWorldBlocks {
    pub fn resolve(registry: &BlockRegistry) -> Self {
        let find = |name: &str| {
            let b = registry.lookup_by_name(name);
            if b.is_dummy() {
                warn!("Flat generator: block {name} not registered, layer left empty");
                None
            } else {
                Some(b.id)
            }
        };
        Self {
            bedrock: find("BEDROCK"),
            dirt: find("DIRT"),
            grass: find("GRASS_DIRT"),
        }
    }

    /// Block of a world layer.
    fn layer(&self, y: i32) -> Option<u32> {
        match y {
            0 => self.bedrock,
            1 | 2 => self.dirt,
            3 => self.grass,
            _ => None,
        }
    }
}

pub struct FlatGenerator {
    blocks: FlatWorldBlocks,
}

impl FlatGenerator {
    pub fn new(registry: &BlockRegistry) -> Self {
        Self {
            blocks: FlatWorldBlocks::resolve(registry),
        }
    }

    pub fn with_blocks(blocks: FlatWorldBlocks) -> Self {
        Self { blocks }
    }
}

impl TerrainGenerator for FlatGenerator {
    fn id(&self) -> &str {
        "flat"
    }

    fn generate(&self, chunk: &mut GeneratingChunk<'_>) -> MapMetadata {
        let mut max_height = None;
        for ly in 0..chunk.size.y {
            let Some(id) = self.blocks.layer(chunk.coord.y + ly) else {
                continue;
            };
            for lx in 0..chunk.size.x {
                for lz in 0..chunk.size.z {
                    chunk.set_block_indirect(lx, ly, lz, id, None, None);
                }
            }
            max_height = Some(chunk.coord.y + ly);
        }
        MapMetadata {
            generator: self.id().to_string(),
            max_height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_registry::AIR_ID;
    use crate::coords::ChunkSize;
    use crate::generator::generate_chunk;
    use webcraft_proto::types::ChunkAddr;

    fn test_blocks() -> FlatWorldBlocks {
        FlatWorldBlocks {
            bedrock: Some(1),
            dirt: Some(2),
            grass: Some(3),
        }
    }

    #[test]
    fn flat_chunk_layer_layout() {
        let gen = FlatGenerator::with_blocks(test_blocks());
        let (blocks, map) = generate_chunk(&gen, ChunkAddr::new(0, 0, 0), ChunkSize::default());
        let id = |y| blocks.get_instance(crate::coords::LocalPos::new(0, y, 0)).id;
        assert_eq!(id(0), 1);
        assert_eq!(id(1), 2);
        assert_eq!(id(2), 2);
        assert_eq!(id(3), 3);
        assert_eq!(id(4), AIR_ID);
        assert_eq!(map.max_height, Some(3));
        assert_eq!(map.generator, "flat");
    }

    #[test]
    fn uniform_across_xz() {
        let gen = FlatGenerator::with_blocks(test_blocks());
        let (blocks, _) = generate_chunk(&gen, ChunkAddr::new(5, 0, -3), ChunkSize::default());
        for x in 0..16 {
            for z in 0..16 {
                assert_eq!(blocks.id_at(crate::coords::LocalPos::new(x, 0, z)), 1);
                assert_eq!(blocks.id_at(crate::coords::LocalPos::new(x, 3, z)), 3);
            }
        }
        assert_eq!(blocks.non_air_count(), 16 * 16 * 4);
    }

    #[test]
    fn other_layers_are_air() {
        let gen = FlatGenerator::with_blocks(test_blocks());
        let (above, map) = generate_chunk(&gen, ChunkAddr::new(0, 1, 0), ChunkSize::default());
        assert_eq!(above.non_air_count(), 0);
        assert_eq!(map.max_height, None);
        let (below, _) = generate_chunk(&gen, ChunkAddr::new(0, -1, 0), ChunkSize::default());
        assert_eq!(below.non_air_count(), 0);
    }

    #[test]
    fn missing_blocks_resolve_to_none() {
        let reg = BlockRegistry::new();
        let blocks = FlatWorldBlocks::resolve(&reg);
        assert_eq!(blocks.bedrock, None);
        let gen = FlatGenerator::new(&reg);
        let (chunk, _) = generate_chunk(&gen, ChunkAddr::new(0, 0, 0), ChunkSize::default());
        assert_eq!(chunk.non_air_count(), 0);
    }
}
