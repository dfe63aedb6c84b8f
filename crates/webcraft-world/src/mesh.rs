//! Face-culling chunk mesher.
//!
//! Produces one float stream per material key. Cells are visited in flat
//! index order and groups are keyed by a `BTreeMap`, so the same storage
//! always yields bit-identical output.

use std::collections::BTreeMap;

use webcraft_proto::types::{BlockPos, ChunkAddr};

use crate::block_registry::{BlockRegistry, BlockType, StyleGroup};
use crate::coords::{ChunkSize, LocalPos};
use crate::typed_blocks::TypedBlocks;

/// Vertex groups keyed by `<pack>/<group>/<texture>`.
pub type VertexGroups = BTreeMap<String, Vec<f32>>;

/// Floats emitted per visible face: center xyz, face index, block id,
/// rotate xyz.
pub const FLOATS_PER_FACE: usize = 8;

/// Face normals, indexed by the face id written into the stream.
pub const FACES: [(i32, i32, i32); 6] = [
    (0, 1, 0),
    (0, -1, 0),
    (0, 0, -1),
    (0, 0, 1),
    (1, 0, 0),
    (-1, 0, 0),
];

fn hides_face(block: &BlockType, neighbor: Option<&BlockType>) -> bool {
    let Some(n) = neighbor else {
        return false;
    };
    if n.is_opaque_cube() {
        return true;
    }
    // Adjacent water or glass of the same kind shares no inner faces.
    block.transparent && n.id == block.id && block.group != StyleGroup::Doubleface
}

/// Build vertex groups for one chunk.
///
/// `neighbor` resolves block ids outside this chunk (by world position);
/// `None` means the neighbor chunk is not available and the face is kept.
pub fn build_vertices<F>(
    addr: ChunkAddr,
    blocks: &TypedBlocks,
    registry: &BlockRegistry,
    neighbor: F,
) -> VertexGroups
where
    F: Fn(BlockPos) -> Option<u32>,
{
    let size: ChunkSize = blocks.size();
    let origin = size.origin(addr);
    let mut groups = VertexGroups::new();

    for index in 0..blocks.volume() {
        let cell = blocks.get_index(index);
        let id = cell.id();
        let Some(block) = registry.get(id) else {
            continue;
        };
        if block.is_air() {
            continue;
        }
        let l = size.unflatten(index);
        let rotate = cell.rotate();
        let mut visible = [false; 6];

        for (face, (dx, dy, dz)) in FACES.iter().enumerate() {
            let n = LocalPos::new(l.x + dx, l.y + dy, l.z + dz);
            let neighbor_id = if size.contains(n) {
                Some(blocks.id_at(n))
            } else {
                neighbor(BlockPos::new(origin.x + n.x, origin.y + n.y, origin.z + n.z))
            };
            visible[face] = !hides_face(block, neighbor_id.and_then(|nid| registry.get(nid)));
        }
        if !visible.contains(&true) {
            continue;
        }

        let buf = groups.entry(block.material_key.clone()).or_default();
        for (face, (dx, dy, dz)) in FACES.iter().enumerate() {
            if !visible[face] {
                continue;
            }
            buf.extend_from_slice(&[
                l.x as f32 + 0.5 + *dx as f32 * 0.5,
                l.y as f32 + 0.5 + *dy as f32 * 0.5,
                l.z as f32 + 0.5 + *dz as f32 * 0.5,
                face as f32,
                id as f32,
                rotate.x,
                rotate.y,
                rotate.z,
            ]);
        }
    }

    groups
}

/// Number of faces across all groups.
pub fn face_count(groups: &VertexGroups) -> usize {
    groups.values().map(|v| v.len() / FLOATS_PER_FACE).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use webcraft_resource_pack::{BlockDefinition, PackConfig};

    fn registry() -> BlockRegistry {
        let mut reg = BlockRegistry::new();
        for v in [
            json!({"id": 1, "name": "STONE", "material": "stone"}),
            json!({
                "id": 2,
                "name": "GLASS",
                "material": "glass",
                "transparent": true,
                "tags": ["glass"]
            }),
        ] {
            let def: BlockDefinition = serde_json::from_value(v).unwrap();
            reg.register(def, "base", &PackConfig::default()).unwrap();
        }
        reg
    }

    #[test]
    fn single_block_has_six_faces() {
        let reg = registry();
        let size = ChunkSize::new(4, 4, 4);
        let mut blocks = TypedBlocks::new(size);
        blocks.set_indirect(LocalPos::new(1, 1, 1), 1, None, None);
        let groups = build_vertices(ChunkAddr::new(0, 0, 0), &blocks, &reg, |_| None);
        assert_eq!(face_count(&groups), 6);
        assert!(groups.contains_key("base/regular/default"));
    }

    #[test]
    fn shared_faces_are_culled() {
        let reg = registry();
        let size = ChunkSize::new(4, 4, 4);
        let mut blocks = TypedBlocks::new(size);
        blocks.set_indirect(LocalPos::new(1, 1, 1), 1, None, None);
        blocks.set_indirect(LocalPos::new(2, 1, 1), 1, None, None);
        let groups = build_vertices(ChunkAddr::new(0, 0, 0), &blocks, &reg, |_| None);
        assert_eq!(face_count(&groups), 10);
    }

    #[test]
    fn glass_next_to_glass_culled_but_not_next_to_stone() {
        let reg = registry();
        let size = ChunkSize::new(4, 4, 4);
        let mut blocks = TypedBlocks::new(size);
        blocks.set_indirect(LocalPos::new(1, 1, 1), 2, None, None);
        blocks.set_indirect(LocalPos::new(2, 1, 1), 2, None, None);
        let groups = build_vertices(ChunkAddr::new(0, 0, 0), &blocks, &reg, |_| None);
        assert_eq!(face_count(&groups), 10);
        assert!(groups.contains_key("base/transparent/default"));
    }

    #[test]
    fn neighbor_chunk_hides_boundary_face() {
        let reg = registry();
        let size = ChunkSize::new(4, 4, 4);
        let mut blocks = TypedBlocks::new(size);
        blocks.set_indirect(LocalPos::new(0, 1, 1), 1, None, None);
        let groups = build_vertices(ChunkAddr::new(0, 0, 0), &blocks, &reg, |pos| {
            (pos.x < 0).then_some(1)
        });
        assert_eq!(face_count(&groups), 5);
    }

    #[test]
    fn rebuild_is_bit_identical() {
        let reg = registry();
        let size = ChunkSize::default();
        let mut blocks = TypedBlocks::new(size);
        for i in (0..size.volume()).step_by(3) {
            blocks.set_indirect(size.unflatten(i), 1 + (i % 2) as u32, None, None);
        }
        let a = build_vertices(ChunkAddr::new(2, 0, -1), &blocks, &reg, |_| None);
        let b = build_vertices(ChunkAddr::new(2, 0, -1), &blocks, &reg, |_| None);
        assert_eq!(a.len(), b.len());
        for (key, va) in &a {
            let vb = &b[key];
            assert_eq!(va.len(), vb.len());
            assert!(va.iter().zip(vb).all(|(x, y)| x.to_bits() == y.to_bits()));
        }
    }
}
