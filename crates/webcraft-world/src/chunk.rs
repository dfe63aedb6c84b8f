//! Client-side chunk: storage, lifecycle state and GPU-side handles.

use std::collections::BTreeMap;

use tracing::{debug, trace};

use webcraft_proto::packets::{BlockSet, ModifyEntry};
use webcraft_proto::types::{BlockPos, ChunkAddr, Vec3};

use crate::block_registry::{BlockRegistry, AIR_ID};
use crate::coords::{ChunkSize, LocalPos};
use crate::extra_data::{ExtraData, ExtraDataSchema};
use crate::light::{light_number, LightSourceMap};
use crate::mesh::VertexGroups;
use crate::render::{BufferHandle, RenderBackend, TextureHandle};
use crate::typed_blocks::{BlockInstance, BlockRef, TypedBlocks, POWER_DEFAULT};
use crate::worker::SetBlockEntry;

/// Lifecycle of a chunk.
///
/// `Created → Generating → Generated → Meshing → Meshed`, back to
/// `Meshing` after every edit, and `Destroyed` at the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    Created,
    Generating,
    Generated,
    Meshing,
    Meshed,
    Destroyed,
}

/// A requested cell write, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct SetBlockRequest {
    pub pos: BlockPos,
    pub id: u32,
    pub power: Option<u32>,
    pub rotate: Option<Vec3>,
    pub extra_data: Option<ExtraData>,
    pub entity_id: Option<String>,
    pub is_modify: bool,
}

impl SetBlockRequest {
    pub fn new(pos: BlockPos, id: u32) -> Self {
        Self {
            pos,
            id,
            power: None,
            rotate: None,
            extra_data: None,
            entity_id: None,
            is_modify: false,
        }
    }

    /// Decode a wire delta. `extra_data` is decoded with the schema of the
    /// target block type.
    pub fn from_block_set(set: &BlockSet, registry: &BlockRegistry) -> Self {
        let schema = registry
            .get(set.item.id)
            .map(|b| b.extra_data_schema)
            .unwrap_or(ExtraDataSchema::Generic);
        Self {
            pos: set.pos,
            id: set.item.id,
            power: set.item.power,
            rotate: set.item.rotate,
            extra_data: set
                .item
                .extra_data
                .as_ref()
                .and_then(|v| ExtraData::decode(schema, v)),
            entity_id: set.item.entity_id.clone(),
            is_modify: set.is_modify,
        }
    }

    pub fn from_modify_entry(entry: &ModifyEntry, registry: &BlockRegistry) -> Self {
        Self::from_block_set(
            &BlockSet {
                pos: entry.pos,
                item: entry.item.clone(),
                is_modify: true,
            },
            registry,
        )
    }

    /// Normalized cell value. `None` when the write must be ignored:
    /// unknown block id or zero power on a placement.
    pub fn to_instance(&self, registry: &BlockRegistry) -> Option<BlockInstance> {
        if self.id == AIR_ID {
            return Some(BlockInstance::air());
        }
        registry.get(self.id)?;
        let power = self.power.unwrap_or(POWER_DEFAULT);
        if power == 0 {
            return None;
        }
        Some(BlockInstance {
            id: self.id,
            power,
            rotate: self.rotate.unwrap_or(Vec3::ZERO),
            extra_data: self.extra_data.clone(),
            entity_id: self.entity_id.clone(),
        })
    }
}

/// A write that reached storage.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedSet {
    /// The cell change followed by re-mesh triggers for neighbor chunks.
    pub entries: Vec<SetBlockEntry>,
    /// `(flat index, new value)` when the cell's light source changed.
    pub light_change: Option<(u32, u8)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SetBlockOutcome {
    Rejected,
    /// Held until generation completes.
    Queued,
    Applied(AppliedSet),
}

/// Chunks that must re-mesh after an edit at `l` in the chunk at `addr`.
///
/// Each axis at a chunk boundary contributes the neighbor on that side;
/// every combination of boundary axes is included (faces, edges and
/// corners), then the y±1 counterpart of each. The chunk itself is never
/// part of the result.
pub fn neighbor_addrs(addr: ChunkAddr, l: LocalPos, size: ChunkSize) -> Vec<ChunkAddr> {
    fn candidates(v: i32, max: i32) -> Vec<i32> {
        let mut c = vec![0];
        if v == 0 {
            c.push(-1);
        }
        if v == max - 1 {
            c.push(1);
        }
        c
    }

    let mut out: Vec<ChunkAddr> = Vec::new();
    let mut push = |a: ChunkAddr| {
        if a != addr && !out.contains(&a) {
            out.push(a);
        }
    };
    for dx in candidates(l.x, size.x) {
        for dy in candidates(l.y, size.y) {
            for dz in candidates(l.z, size.z) {
                if (dx, dy, dz) == (0, 0, 0) {
                    continue;
                }
                let n = addr.offset(dx, dy, dz);
                push(n);
                push(n.offset(0, 1, 0));
                push(n.offset(0, -1, 0));
            }
        }
    }
    out
}

pub struct Chunk {
    pub addr: ChunkAddr,
    /// World position of the minimum corner.
    pub coord: BlockPos,
    pub size: ChunkSize,
    pub state: ChunkState,
    /// Storage is populated.
    pub inited: bool,
    /// Needs a mesh rebuild.
    pub dirty: bool,
    pub build_vertices_in_progress: bool,
    /// The server holds edits for this chunk.
    pub has_modifiers: bool,
    tblocks: Option<TypedBlocks>,
    light_source: Option<LightSourceMap>,
    buffers: BTreeMap<String, BufferHandle>,
    light_texture: Option<TextureHandle>,
    pending: Vec<SetBlockRequest>,
}

impl Chunk {
    pub fn new(addr: ChunkAddr, size: ChunkSize, has_modifiers: bool) -> Self {
        Self {
            addr,
            coord: size.origin(addr),
            size,
            state: ChunkState::Created,
            inited: false,
            dirty: false,
            build_vertices_in_progress: false,
            has_modifiers,
            tblocks: None,
            light_source: None,
            buffers: BTreeMap::new(),
            light_texture: None,
            pending: Vec::new(),
        }
    }

    pub fn blocks(&self) -> Option<&TypedBlocks> {
        self.tblocks.as_ref()
    }

    pub fn light_source(&self) -> Option<&LightSourceMap> {
        self.light_source.as_ref()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn light_texture(&self) -> Option<TextureHandle> {
        self.light_texture
    }

    /// Cell at a world position, if storage is ready and the position is
    /// inside this chunk. `None` before generation; [`ChunkManager::get_block`]
    /// turns that into the dummy block.
    ///
    /// [`ChunkManager::get_block`]: crate::chunk_manager::ChunkManager::get_block
    pub fn get_block(&self, pos: BlockPos) -> Option<BlockRef<'_>> {
        let l = self.size.local_checked(pos, self.coord)?;
        Some(self.tblocks.as_ref()?.get(l))
    }

    pub fn mark_generating(&mut self) {
        if self.state == ChunkState::Created {
            self.state = ChunkState::Generating;
        }
    }

    /// Write one cell.
    ///
    /// Out-of-range positions, unknown ids and zero-power placements are
    /// rejected without touching storage. Before generation completes
    /// valid writes are queued and replayed by
    /// [`Chunk::on_blocks_generated`].
    pub fn set_block(&mut self, req: SetBlockRequest, registry: &BlockRegistry) -> SetBlockOutcome {
        let Some(l) = self.size.local_checked(req.pos, self.coord) else {
            trace!("set block {} outside chunk {}", req.pos, self.addr);
            return SetBlockOutcome::Rejected;
        };
        let Some(block) = req.to_instance(registry) else {
            return SetBlockOutcome::Rejected;
        };
        if self.state == ChunkState::Destroyed {
            return SetBlockOutcome::Rejected;
        }
        let (Some(tblocks), Some(light)) = (self.tblocks.as_mut(), self.light_source.as_mut())
        else {
            self.pending.push(req);
            return SetBlockOutcome::Queued;
        };

        let light_value = light_number(registry, block.id);
        if block.id == AIR_ID {
            tblocks.delete(l);
        } else {
            tblocks.set(l, block.clone());
        }
        let light_change = light.set(l, light_value).map(|i| (i as u32, light_value));

        let mut entries = vec![SetBlockEntry::Block {
            pos: req.pos,
            block,
        }];
        entries.extend(
            neighbor_addrs(self.addr, l, self.size)
                .into_iter()
                .map(|addr| SetBlockEntry::Remesh { addr }),
        );
        SetBlockOutcome::Applied(AppliedSet {
            entries,
            light_change,
        })
    }

    /// Take over generated storage and replay queued writes in arrival
    /// order.
    pub fn on_blocks_generated(
        &mut self,
        blocks: TypedBlocks,
        registry: &BlockRegistry,
    ) -> Vec<AppliedSet> {
        self.light_source = Some(LightSourceMap::from_blocks(&blocks, registry));
        self.tblocks = Some(blocks);
        self.inited = true;
        self.dirty = true;
        if !matches!(self.state, ChunkState::Meshing | ChunkState::Meshed) {
            self.state = ChunkState::Generated;
        }
        let pending = std::mem::take(&mut self.pending);
        if !pending.is_empty() {
            debug!("Replaying {} queued writes on chunk {}", pending.len(), self.addr);
        }
        pending
            .into_iter()
            .filter_map(|req| match self.set_block(req, registry) {
                SetBlockOutcome::Applied(applied) => Some(applied),
                _ => None,
            })
            .collect()
    }

    /// Claim a mesh build. Returns `false` while one is already in flight
    /// or before storage exists.
    pub fn request_build(&mut self) -> bool {
        if !self.inited || self.build_vertices_in_progress || self.state == ChunkState::Destroyed {
            return false;
        }
        self.begin_build();
        true
    }

    /// Mark a build dispatched by someone else (a batched block update).
    pub fn begin_build(&mut self) {
        self.build_vertices_in_progress = true;
        self.dirty = false;
        self.state = ChunkState::Meshing;
    }

    /// Swap in new vertex groups. The light texture is taken from the pool
    /// on first use.
    pub fn apply_vertices(&mut self, groups: VertexGroups, backend: &mut dyn RenderBackend) {
        if self.state == ChunkState::Destroyed {
            return;
        }
        for handle in std::mem::take(&mut self.buffers).into_values() {
            backend.destroy_buffer(handle);
        }
        for (key, vertices) in &groups {
            if vertices.is_empty() {
                continue;
            }
            let handle = backend.create_buffer(self.addr, key, vertices);
            self.buffers.insert(key.clone(), handle);
        }
        if self.light_texture.is_none() && !self.buffers.is_empty() {
            self.light_texture = Some(backend.alloc_light_texture(self.addr));
        }
        self.build_vertices_in_progress = false;
        self.state = ChunkState::Meshed;
    }

    /// Release buffers and the light texture.
    pub fn destruct(&mut self, backend: &mut dyn RenderBackend) {
        for handle in std::mem::take(&mut self.buffers).into_values() {
            backend.destroy_buffer(handle);
        }
        if let Some(tex) = self.light_texture.take() {
            backend.release_light_texture(tex);
        }
        self.pending.clear();
        self.state = ChunkState::Destroyed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::HeadlessBackend;
    use serde_json::json;
    use webcraft_proto::packets::BlockItem;
    use webcraft_resource_pack::{BlockDefinition, PackConfig};

    fn registry() -> BlockRegistry {
        let mut reg = BlockRegistry::new();
        for v in [
            json!({"id": 5, "name": "STONE", "material": "stone"}),
            json!({"id": 50, "name": "TORCH", "material": "wood", "light_power": {"a": 160}}),
        ] {
            let def: BlockDefinition = serde_json::from_value(v).unwrap();
            reg.register(def, "base", &PackConfig::default()).unwrap();
        }
        reg
    }

    fn ready_chunk(addr: ChunkAddr, reg: &BlockRegistry) -> Chunk {
        let size = ChunkSize::default();
        let mut chunk = Chunk::new(addr, size, false);
        chunk.mark_generating();
        chunk.on_blocks_generated(TypedBlocks::new(size), reg);
        chunk
    }

    #[test]
    fn boundary_fan_out_west_north() {
        let addrs = neighbor_addrs(
            ChunkAddr::new(0, 0, 0),
            LocalPos::new(0, 10, 0),
            ChunkSize::default(),
        );
        let mut expected = Vec::new();
        for (x, z) in [(-1, 0), (0, -1), (-1, -1)] {
            for y in [-1, 0, 1] {
                expected.push(ChunkAddr::new(x, y, z));
            }
        }
        assert_eq!(addrs.len(), 9);
        for e in &expected {
            assert!(addrs.contains(e), "missing {e}");
        }
        assert!(!addrs.contains(&ChunkAddr::new(0, 0, 0)));
    }

    #[test]
    fn interior_cell_has_no_neighbors() {
        let addrs = neighbor_addrs(
            ChunkAddr::new(3, 0, 3),
            LocalPos::new(5, 10, 5),
            ChunkSize::default(),
        );
        assert!(addrs.is_empty());
    }

    #[test]
    fn corner_cell_fans_out_to_all_combinations() {
        let addrs = neighbor_addrs(
            ChunkAddr::new(0, 0, 0),
            LocalPos::new(15, 0, 15),
            ChunkSize::default(),
        );
        // 7 boundary combinations plus vertical counterparts, deduplicated.
        assert!(addrs.contains(&ChunkAddr::new(1, -1, 1)));
        assert!(addrs.contains(&ChunkAddr::new(0, -1, 0)));
        assert!(addrs.contains(&ChunkAddr::new(1, -2, 1)));
        assert!(!addrs.contains(&ChunkAddr::new(0, 0, 0)));
        let mut sorted = addrs.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), addrs.len());
    }

    #[test]
    fn place_then_query() {
        let reg = registry();
        let mut chunk = ready_chunk(ChunkAddr::new(1, 0, 0), &reg);
        let pos = BlockPos::new(18, 10, 3);
        let req = SetBlockRequest {
            power: Some(100),
            ..SetBlockRequest::new(pos, 5)
        };
        assert!(matches!(chunk.set_block(req, &reg), SetBlockOutcome::Applied(_)));
        let b = chunk.get_block(pos).unwrap();
        assert_eq!(b.id(), 5);
        assert_eq!(b.power(), 100);
        assert_eq!(b.rotate(), Vec3::ZERO);
    }

    #[test]
    fn zero_power_rejected() {
        let reg = registry();
        let mut chunk = ready_chunk(ChunkAddr::new(1, 0, 0), &reg);
        let pos = BlockPos::new(18, 10, 3);
        let req = SetBlockRequest {
            power: Some(0),
            ..SetBlockRequest::new(pos, 5)
        };
        assert_eq!(chunk.set_block(req, &reg), SetBlockOutcome::Rejected);
        assert_eq!(chunk.get_block(pos).unwrap().id(), AIR_ID);
    }

    #[test]
    fn out_of_range_and_unknown_rejected() {
        let reg = registry();
        let mut chunk = ready_chunk(ChunkAddr::new(0, 0, 0), &reg);
        assert_eq!(
            chunk.set_block(SetBlockRequest::new(BlockPos::new(16, 0, 0), 5), &reg),
            SetBlockOutcome::Rejected
        );
        assert_eq!(
            chunk.set_block(SetBlockRequest::new(BlockPos::new(1, 0, 0), 12345), &reg),
            SetBlockOutcome::Rejected
        );
        assert_eq!(chunk.blocks().unwrap().non_air_count(), 0);
    }

    #[test]
    fn writes_before_generation_are_replayed() {
        let reg = registry();
        let size = ChunkSize::default();
        let mut chunk = Chunk::new(ChunkAddr::new(0, 0, 0), size, false);
        chunk.mark_generating();
        assert!(chunk.get_block(BlockPos::new(1, 1, 1)).is_none());
        let first = SetBlockRequest::new(BlockPos::new(1, 1, 1), 5);
        let second = SetBlockRequest::new(BlockPos::new(1, 1, 1), 50);
        assert_eq!(chunk.set_block(first, &reg), SetBlockOutcome::Queued);
        assert_eq!(chunk.set_block(second, &reg), SetBlockOutcome::Queued);
        let applied = chunk.on_blocks_generated(TypedBlocks::new(size), &reg);
        assert_eq!(applied.len(), 2);
        assert_eq!(chunk.get_block(BlockPos::new(1, 1, 1)).unwrap().id(), 50);
        assert_eq!(chunk.pending_len(), 0);
        assert_eq!(chunk.state, ChunkState::Generated);
    }

    #[test]
    fn light_change_only_when_value_differs() {
        let reg = registry();
        let mut chunk = ready_chunk(ChunkAddr::new(0, 0, 0), &reg);
        let pos = BlockPos::new(4, 4, 4);
        let light = |o: SetBlockOutcome| match o {
            SetBlockOutcome::Applied(a) => a.light_change,
            other => panic!("unexpected {other:?}"),
        };
        assert!(light(chunk.set_block(SetBlockRequest::new(pos, 5), &reg)).is_some());
        assert!(light(chunk.set_block(SetBlockRequest::new(pos, 5), &reg)).is_none());
        assert!(light(chunk.set_block(SetBlockRequest::new(pos, 50), &reg)).is_some());
        assert!(light(chunk.set_block(SetBlockRequest::new(pos, 50), &reg)).is_none());
        assert_eq!(
            light(chunk.set_block(SetBlockRequest::new(pos, AIR_ID), &reg)).map(|(_, v)| v),
            Some(0)
        );
    }

    #[test]
    fn wire_delta_defaults() {
        let reg = registry();
        let set = BlockSet {
            pos: BlockPos::new(1, 2, 3),
            item: BlockItem::new(5),
            is_modify: true,
        };
        let req = SetBlockRequest::from_block_set(&set, &reg);
        let inst = req.to_instance(&reg).unwrap();
        assert_eq!(inst, BlockInstance::new(5));
        assert!(req.is_modify);
    }

    #[test]
    fn build_guard_and_destruct() {
        let reg = registry();
        let mut backend = HeadlessBackend::new();
        let mut chunk = ready_chunk(ChunkAddr::new(0, 0, 0), &reg);
        assert!(chunk.request_build());
        assert!(!chunk.request_build());
        let mut groups = VertexGroups::new();
        groups.insert("base/regular/default".into(), vec![0.0; 8]);
        chunk.apply_vertices(groups, &mut backend);
        assert_eq!(chunk.state, ChunkState::Meshed);
        assert_eq!(backend.live_buffers(), 1);
        assert_eq!(backend.live_textures(), 1);
        assert!(chunk.request_build());
        chunk.destruct(&mut backend);
        assert_eq!(backend.live_buffers(), 0);
        assert_eq!(backend.live_textures(), 0);
        assert!(!chunk.request_build());
    }
}
