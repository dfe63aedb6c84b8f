//! Client-side chunk manager.
//!
//! Sole owner of the address-keyed chunk table. Chunks never reference each
//! other; cross-chunk effects go through the manager and the worker link.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use webcraft_proto::codec::Packet;
use webcraft_proto::packets::{BlockSet, ChunkLoad, ChunkLoaded, ChunkSnapshot, NearbyChunks};
use webcraft_proto::types::{BlockPos, ChunkAddr};

use crate::block_registry::{BlockRegistry, BlockType};
use crate::chunk::{AppliedSet, Chunk, SetBlockOutcome, SetBlockRequest};
use crate::coords::ChunkSize;
use crate::error::WorldError;
use crate::light::LightUpdate;
use crate::render::RenderBackend;
use crate::typed_blocks::{BlockInstance, TypedBlocksSnapshot};
use crate::worker::{SetBlockEntry, WorkerLink, WorkerMessage, WorkerResult};

const FACE_OFFSETS: [(i32, i32, i32); 6] = [
    (1, 0, 0),
    (-1, 0, 0),
    (0, 1, 0),
    (0, -1, 0),
    (0, 0, 1),
    (0, 0, -1),
];

pub struct ChunkManager {
    size: ChunkSize,
    registry: Arc<BlockRegistry>,
    worker: Box<dyn WorkerLink>,
    render: Box<dyn RenderBackend>,
    chunks: HashMap<ChunkAddr, Chunk>,
    destruct_queue: Vec<ChunkAddr>,
    light_updates: Vec<LightUpdate>,
    render_dist: i32,
}

impl ChunkManager {
    pub fn new(
        size: ChunkSize,
        registry: Arc<BlockRegistry>,
        worker: Box<dyn WorkerLink>,
        render: Box<dyn RenderBackend>,
    ) -> Self {
        Self {
            size,
            registry,
            worker,
            render,
            chunks: HashMap::new(),
            destruct_queue: Vec::new(),
            light_updates: Vec::new(),
            render_dist: 0,
        }
    }

    pub fn size(&self) -> ChunkSize {
        self.size
    }

    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    pub fn render(&self) -> &dyn RenderBackend {
        self.render.as_ref()
    }

    pub fn render_dist(&self) -> i32 {
        self.render_dist
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn get_chunk(&self, addr: ChunkAddr) -> Option<&Chunk> {
        self.chunks.get(&addr)
    }

    pub fn contains(&self, addr: ChunkAddr) -> bool {
        self.chunks.contains_key(&addr)
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────────

    /// Register a chunk the server announced.
    ///
    /// Chunks with server-side edits wait for their modify list; the
    /// returned request must be sent to the server. Others start generating
    /// right away.
    pub fn add_chunk(&mut self, addr: ChunkAddr, has_modifiers: bool) -> Option<ChunkLoad> {
        if self.chunks.contains_key(&addr) {
            return None;
        }
        if !self.size.addr_in_range(addr) {
            warn!("chunk {addr} is outside the world, ignored");
            return None;
        }
        // A teardown still queued for this address must reach the worker
        // before the new chunk does.
        if self.destruct_queue.contains(&addr) {
            self.flush_destructs();
        }
        let mut chunk = Chunk::new(addr, self.size, has_modifiers);
        if has_modifiers {
            self.chunks.insert(addr, chunk);
            return Some(ChunkLoad { pos: addr });
        }
        chunk.mark_generating();
        self.chunks.insert(addr, chunk);
        self.worker.post(WorkerMessage::CreateChunk {
            addr,
            modify_list: Vec::new(),
            snapshot: None,
        });
        None
    }

    /// Server sent the edits of a chunk.
    pub fn on_modifiers_loaded(&mut self, msg: ChunkLoaded) {
        let Some(chunk) = self.chunks.get_mut(&msg.addr) else {
            debug!("modify list for unknown chunk {} dropped", msg.addr);
            return;
        };
        if chunk.state == crate::chunk::ChunkState::Created {
            chunk.mark_generating();
            self.worker.post(WorkerMessage::CreateChunk {
                addr: msg.addr,
                modify_list: msg.modify_list,
                snapshot: None,
            });
            return;
        }
        // Already generating or generated: the edits go through the normal
        // write path and are queued if needed.
        for entry in &msg.modify_list {
            let req = SetBlockRequest::from_modify_entry(entry, &self.registry);
            self.set_block(req);
        }
    }

    /// Server sent the full storage of a chunk.
    pub fn on_snapshot(&mut self, msg: ChunkSnapshot) -> Result<(), WorldError> {
        let Some(chunk) = self.chunks.get_mut(&msg.addr) else {
            debug!("snapshot for unknown chunk {} dropped", msg.addr);
            return Ok(());
        };
        let snapshot = TypedBlocksSnapshot::unpack(&msg.data)?;
        if snapshot.size != self.size {
            return Err(WorldError::SnapshotSizeMismatch {
                expected: self.size.volume(),
                got: snapshot.size.volume(),
            });
        }
        chunk.mark_generating();
        self.worker.post(WorkerMessage::CreateChunk {
            addr: msg.addr,
            modify_list: Vec::new(),
            snapshot: Some(snapshot),
        });
        Ok(())
    }

    /// Drop a chunk. GPU resources are released now; worker and light
    /// teardown go out with the next [`ChunkManager::update`].
    pub fn remove_chunk(&mut self, addr: ChunkAddr) -> bool {
        let Some(mut chunk) = self.chunks.remove(&addr) else {
            return false;
        };
        chunk.destruct(self.render.as_mut());
        self.destruct_queue.push(addr);
        true
    }

    /// Apply one nearby-set change: removals first, then additions.
    /// Returns the chunk load requests to send.
    pub fn apply_nearby(&mut self, msg: &NearbyChunks) -> Vec<Packet> {
        self.render_dist = msg.chunk_render_dist;
        for addr in &msg.deleted {
            self.remove_chunk(*addr);
        }
        let mut out = Vec::new();
        for added in &msg.added {
            if let Some(req) = self.add_chunk(added.addr, added.has_modifiers) {
                match Packet::new(&req) {
                    Ok(p) => out.push(p),
                    Err(e) => warn!("Failed to encode chunk load for {}: {e}", added.addr),
                }
            }
        }
        out
    }

    // ─── Blocks ─────────────────────────────────────────────────────────────

    /// Cell at a world position. Missing or not yet generated chunks yield
    /// the dummy block.
    pub fn get_block(&self, pos: BlockPos) -> BlockInstance {
        self.chunks
            .get(&self.size.chunk_addr(pos))
            .and_then(|c| c.get_block(pos))
            .map(|b| b.to_instance())
            .unwrap_or_else(|| BlockInstance::new(self.registry.dummy().id))
    }

    pub fn block_type_at(&self, pos: BlockPos) -> &BlockType {
        self.registry.lookup_by_id(self.get_block(pos).id)
    }

    /// Single write. Dispatches one batched worker update for the cell and
    /// its neighbors.
    pub fn set_block(&mut self, req: SetBlockRequest) -> SetBlockOutcome {
        let addr = self.size.chunk_addr(req.pos);
        let Some(chunk) = self.chunks.get_mut(&addr) else {
            debug!("set block at {} in missing chunk {addr} dropped", req.pos);
            return SetBlockOutcome::Rejected;
        };
        let outcome = chunk.set_block(req, &self.registry);
        if let SetBlockOutcome::Applied(applied) = &outcome {
            if let Some((index, value)) = applied.light_change {
                self.light_updates.push(LightUpdate::Cells {
                    addr,
                    changes: vec![(index, value)],
                });
            }
            self.dispatch(applied.entries.clone());
        }
        outcome
    }

    /// Apply a group of wire deltas for one chunk, in order.
    ///
    /// Emits a single light source update and a single worker message for
    /// the whole group.
    pub fn apply_block_set_group(&mut self, addr: ChunkAddr, items: &[BlockSet]) -> usize {
        let Some(chunk) = self.chunks.get_mut(&addr) else {
            debug!("{} block sets for missing chunk {addr} dropped", items.len());
            return 0;
        };
        let mut entries: Vec<SetBlockEntry> = Vec::new();
        let mut light_changed = false;
        let mut applied = 0;
        for item in items {
            let req = SetBlockRequest::from_block_set(item, &self.registry);
            if let SetBlockOutcome::Applied(a) = chunk.set_block(req, &self.registry) {
                applied += 1;
                light_changed |= a.light_change.is_some();
                for e in a.entries {
                    if matches!(e, SetBlockEntry::Remesh { .. }) && entries.contains(&e) {
                        continue;
                    }
                    entries.push(e);
                }
            }
        }
        if light_changed {
            if let Some(light) = chunk.light_source() {
                self.light_updates.push(LightUpdate::Full {
                    addr,
                    data: light.data().to_vec(),
                });
            }
        }
        if !entries.is_empty() {
            self.dispatch(entries);
        }
        applied
    }

    fn dispatch(&mut self, entries: Vec<SetBlockEntry>) {
        for entry in &entries {
            if let Some(chunk) = self.chunks.get_mut(&entry.addr(self.size)) {
                if chunk.inited {
                    chunk.begin_build();
                }
            }
        }
        self.worker.post(WorkerMessage::SetBlock { list: entries });
    }

    fn dispatch_replayed(&mut self, addr: ChunkAddr, replayed: Vec<AppliedSet>) {
        if replayed.is_empty() {
            return;
        }
        trace!("{} replayed writes on {addr}", replayed.len());
        let entries = replayed.into_iter().flat_map(|a| a.entries).collect();
        self.dispatch(entries);
    }

    // ─── Worker results ─────────────────────────────────────────────────────

    /// Apply everything the worker produced since the last call. Results
    /// for chunks that are gone are discarded.
    pub fn process_worker_results(&mut self) -> usize {
        let results = self.worker.poll();
        let count = results.len();
        for result in results {
            match result {
                WorkerResult::BlocksGenerated { addr, blocks, map } => {
                    let Some(chunk) = self.chunks.get_mut(&addr) else {
                        debug!("generated blocks for removed chunk {addr} discarded");
                        continue;
                    };
                    trace!("chunk {addr} generated by {}", map.generator);
                    let replayed = chunk.on_blocks_generated(blocks, &self.registry);
                    if let Some(light) = chunk.light_source() {
                        self.light_updates.push(LightUpdate::Full {
                            addr,
                            data: light.data().to_vec(),
                        });
                    }
                    self.dispatch_replayed(addr, replayed);
                    for (dx, dy, dz) in FACE_OFFSETS {
                        if let Some(n) = self.chunks.get_mut(&addr.offset(dx, dy, dz)) {
                            if n.inited {
                                n.dirty = true;
                            }
                        }
                    }
                }
                WorkerResult::VerticesGenerated { addr, groups } => {
                    let Some(chunk) = self.chunks.get_mut(&addr) else {
                        debug!("vertices for removed chunk {addr} discarded");
                        continue;
                    };
                    chunk.apply_vertices(groups, self.render.as_mut());
                }
            }
        }
        count
    }

    /// Per-frame housekeeping: apply worker results, flush teardown and
    /// request meshes for dirty chunks.
    pub fn update(&mut self) {
        self.process_worker_results();
        self.flush_destructs();

        let mut addrs: Vec<ChunkAddr> = self
            .chunks
            .values_mut()
            .filter(|c| c.dirty)
            .filter_map(|c| c.request_build().then_some(c.addr))
            .collect();
        if !addrs.is_empty() {
            addrs.sort();
            self.worker.post(WorkerMessage::BuildVertices { addrs });
        }
    }

    fn flush_destructs(&mut self) {
        if self.destruct_queue.is_empty() {
            return;
        }
        let addrs = std::mem::take(&mut self.destruct_queue);
        self.light_updates.push(LightUpdate::Destruct {
            addrs: addrs.clone(),
        });
        self.worker.post(WorkerMessage::DestructChunk { addrs });
    }

    /// Messages for the light worker accumulated since the last call.
    pub fn take_light_updates(&mut self) -> Vec<LightUpdate> {
        std::mem::take(&mut self.light_updates)
    }
}
