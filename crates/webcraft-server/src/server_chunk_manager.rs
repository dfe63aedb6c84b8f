//! Address-keyed collection of loaded server chunks, plus the visibility
//! helpers that decide which chunks each player is told about.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use webcraft_proto::types::ChunkAddr;
use webcraft_world::block_registry::BlockRegistry;
use webcraft_world::coords::ChunkSize;
use webcraft_world::error::WorldError;
use webcraft_world::generator::TerrainGenerator;
use webcraft_world::modified::ModifiedChunkSet;
use webcraft_world::storage::WorldStore;

use crate::server_chunk::ServerChunk;

/// Chunk rows above and below the player's chunk that are always visible.
pub const VERTICAL_MARGIN: i32 = 3;

pub struct ServerChunkManager {
    size: ChunkSize,
    generator: Arc<dyn TerrainGenerator>,
    registry: Arc<BlockRegistry>,
    chunks: HashMap<ChunkAddr, ServerChunk>,
}

impl ServerChunkManager {
    pub fn new(
        size: ChunkSize,
        generator: Arc<dyn TerrainGenerator>,
        registry: Arc<BlockRegistry>,
    ) -> Self {
        Self {
            size,
            generator,
            registry,
            chunks: HashMap::new(),
        }
    }

    pub fn size(&self) -> ChunkSize {
        self.size
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn get_loaded(&self, addr: ChunkAddr) -> Option<&ServerChunk> {
        self.chunks.get(&addr)
    }

    pub fn get_loaded_mut(&mut self, addr: ChunkAddr) -> Option<&mut ServerChunk> {
        self.chunks.get_mut(&addr)
    }

    /// Return the chunk, generating it first if needed. A modified chunk
    /// gets its stored edits replayed before it is returned.
    pub async fn get(
        &mut self,
        addr: ChunkAddr,
        store: &mut dyn WorldStore,
        modified: &ModifiedChunkSet,
    ) -> Result<&mut ServerChunk, WorldError> {
        if !self.chunks.contains_key(&addr) {
            let modify_list = if modified.has_modifications(addr) {
                store.load_modify_list(addr)?
            } else {
                Vec::new()
            };
            let chunk = ServerChunk::load(
                addr,
                self.size,
                self.generator.clone(),
                self.registry.clone(),
                modify_list,
            )
            .await?;
            self.chunks.insert(addr, chunk);
        }
        self.chunks
            .get_mut(&addr)
            .ok_or(WorldError::ChunkNotLoaded(addr))
    }

    pub fn remove(&mut self, addr: ChunkAddr) -> Option<ServerChunk> {
        self.chunks.remove(&addr)
    }

    /// Drop `player_id` from every chunk's audience.
    pub fn forget_player(&mut self, player_id: u64) {
        for chunk in self.chunks.values_mut() {
            chunk.players.remove(&player_id);
        }
    }

    /// Remove chunks no player needs any more. Returns how many went.
    pub fn unload_unused(&mut self) -> usize {
        let before = self.chunks.len();
        self.chunks.retain(|_, c| !c.players.is_empty());
        let removed = before - self.chunks.len();
        if removed > 0 {
            debug!("Unloaded {removed} unused chunks");
        }
        removed
    }
}

// ─── Visibility ─────────────────────────────────────────────────────────────

/// Chunk addresses around `center`, nearest first. Horizontal reach is the
/// render distance, vertical reach is [`VERTICAL_MARGIN`]. Rows below
/// `min_chunk_y` and chunks whose blocks fall outside `i32` positions are
/// skipped.
pub fn spiral_addrs(
    size: ChunkSize,
    center: ChunkAddr,
    render_dist: i32,
    min_chunk_y: i32,
) -> Vec<ChunkAddr> {
    let m = render_dist.max(0);
    let mut out = Vec::new();
    for dy in -VERTICAL_MARGIN..=VERTICAL_MARGIN {
        let Some(y) = center.y.checked_add(dy) else {
            continue;
        };
        if y < min_chunk_y {
            continue;
        }
        for dx in -m..=m {
            for dz in -m..=m {
                let (Some(x), Some(z)) = (center.x.checked_add(dx), center.z.checked_add(dz))
                else {
                    continue;
                };
                let addr = ChunkAddr::new(x, y, z);
                if size.addr_in_range(addr) {
                    out.push(addr);
                }
            }
        }
    }
    out.sort_by_key(|a| (a.distance_sq(&center), a.y, a.x, a.z));
    out
}

/// Split a visibility change into newly visible (in `next` order) and no
/// longer visible addresses.
pub fn diff_nearby(
    prev: &HashSet<ChunkAddr>,
    next: &[ChunkAddr],
) -> (Vec<ChunkAddr>, Vec<ChunkAddr>) {
    let next_set: HashSet<ChunkAddr> = next.iter().copied().collect();
    let mut seen = HashSet::new();
    let added: Vec<ChunkAddr> = next
        .iter()
        .copied()
        .filter(|a| !prev.contains(a) && seen.insert(*a))
        .collect();
    let mut deleted: Vec<ChunkAddr> = prev
        .iter()
        .copied()
        .filter(|a| !next_set.contains(a))
        .collect();
    deleted.sort_by_key(|a| (a.y, a.x, a.z));
    (added, deleted)
}
