//! Authoritative server-side chunk.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use webcraft_proto::packets::ModifyEntry;
use webcraft_proto::types::{BlockPos, ChunkAddr};
use webcraft_world::block_registry::{BlockRegistry, AIR_ID};
use webcraft_world::chunk::SetBlockRequest;
use webcraft_world::coords::ChunkSize;
use webcraft_world::error::WorldError;
use webcraft_world::generator::{apply_modify_list, generate_chunk, TerrainGenerator};
use webcraft_world::typed_blocks::{BlockInstance, TypedBlocks};

pub struct ServerChunk {
    pub addr: ChunkAddr,
    pub size: ChunkSize,
    pub blocks: TypedBlocks,
    /// Edits on top of generated terrain, in first-write order.
    pub modify_list: Vec<ModifyEntry>,
    /// Players that requested this chunk and still see it.
    pub players: HashSet<u64>,
}

impl ServerChunk {
    /// Generate the chunk off the async runtime and replay its edits.
    pub async fn load(
        addr: ChunkAddr,
        size: ChunkSize,
        generator: Arc<dyn TerrainGenerator>,
        registry: Arc<BlockRegistry>,
        modify_list: Vec<ModifyEntry>,
    ) -> Result<Self, WorldError> {
        let task = tokio::task::spawn_blocking(move || {
            let (mut blocks, _map) = generate_chunk(generator.as_ref(), addr, size);
            let applied = apply_modify_list(&mut blocks, addr, &modify_list, &registry);
            debug!("Chunk {addr} loaded, {applied} edits replayed");
            (blocks, modify_list)
        });
        let (blocks, modify_list) = task
            .await
            .map_err(|e| WorldError::Generation(format!("chunk {addr}: {e}")))?;
        Ok(Self {
            addr,
            size,
            blocks,
            modify_list,
            players: HashSet::new(),
        })
    }

    pub fn get_block(&self, pos: BlockPos) -> Option<BlockInstance> {
        let l = self.size.local_checked(pos, self.size.origin(self.addr))?;
        Some(self.blocks.get_instance(l))
    }

    /// Validate and apply one edit. Returns the stored value, or `None` if
    /// the request was rejected.
    pub fn set_block(
        &mut self,
        req: &SetBlockRequest,
        registry: &BlockRegistry,
    ) -> Option<BlockInstance> {
        let l = self
            .size
            .local_checked(req.pos, self.size.origin(self.addr))?;
        let block = req.to_instance(registry)?;
        if block.id == AIR_ID {
            self.blocks.delete(l);
        } else {
            self.blocks.set(l, block.clone());
        }
        let entry = ModifyEntry {
            pos: req.pos,
            item: block.to_item(),
        };
        match self.modify_list.iter_mut().find(|e| e.pos == req.pos) {
            Some(existing) => *existing = entry,
            None => self.modify_list.push(entry),
        }
        Some(block)
    }
}
