//! Generation and meshing worker.
//!
//! The worker owns its own chunk table. The main context talks to it only
//! through [`WorkerMessage`]s and receives [`WorkerResult`]s; generated
//! storage is handed over by value.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use webcraft_proto::packets::ModifyEntry;
use webcraft_proto::types::{BlockPos, ChunkAddr};

use crate::block_registry::{BlockRegistry, AIR_ID};
use crate::coords::ChunkSize;
use crate::generator::{apply_modify_list, generate_chunk, MapMetadata, TerrainGenerator};
use crate::mesh::{build_vertices, VertexGroups};
use crate::typed_blocks::{BlockInstance, TypedBlocks, TypedBlocksSnapshot};

/// One change inside a batched block update.
#[derive(Debug, Clone, PartialEq)]
pub enum SetBlockEntry {
    /// Overwrite a cell.
    Block { pos: BlockPos, block: BlockInstance },
    /// Re-mesh a neighbor, no block change.
    Remesh { addr: ChunkAddr },
}

impl SetBlockEntry {
    pub fn addr(&self, size: ChunkSize) -> ChunkAddr {
        match self {
            SetBlockEntry::Block { pos, .. } => size.chunk_addr(*pos),
            SetBlockEntry::Remesh { addr } => *addr,
        }
    }
}

/// Main → worker.
#[derive(Debug, Clone)]
pub enum WorkerMessage {
    /// Generate (or restore) a chunk and report its storage.
    CreateChunk {
        addr: ChunkAddr,
        modify_list: Vec<ModifyEntry>,
        snapshot: Option<TypedBlocksSnapshot>,
    },
    DestructChunk { addrs: Vec<ChunkAddr> },
    /// Apply changes, then re-mesh every chunk they touch.
    SetBlock { list: Vec<SetBlockEntry> },
    BuildVertices { addrs: Vec<ChunkAddr> },
}

/// Worker → main.
#[derive(Debug)]
pub enum WorkerResult {
    BlocksGenerated {
        addr: ChunkAddr,
        blocks: TypedBlocks,
        map: MapMetadata,
    },
    VerticesGenerated {
        addr: ChunkAddr,
        groups: VertexGroups,
    },
}

/// Worker-side world state.
pub struct WorkerWorld {
    size: ChunkSize,
    registry: Arc<BlockRegistry>,
    generator: Arc<dyn TerrainGenerator>,
    chunks: HashMap<ChunkAddr, TypedBlocks>,
}

impl WorkerWorld {
    pub fn new(
        size: ChunkSize,
        registry: Arc<BlockRegistry>,
        generator: Arc<dyn TerrainGenerator>,
    ) -> Self {
        Self {
            size,
            registry,
            generator,
            chunks: HashMap::new(),
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn handle(&mut self, msg: WorkerMessage) -> Vec<WorkerResult> {
        match msg {
            WorkerMessage::CreateChunk {
                addr,
                modify_list,
                snapshot,
            } => vec![self.create_chunk(addr, &modify_list, snapshot)],
            WorkerMessage::DestructChunk { addrs } => {
                for addr in &addrs {
                    self.chunks.remove(addr);
                }
                Vec::new()
            }
            WorkerMessage::SetBlock { list } => self.set_blocks(list),
            WorkerMessage::BuildVertices { addrs } => addrs
                .into_iter()
                .filter_map(|addr| self.build(addr))
                .collect(),
        }
    }

    fn create_chunk(
        &mut self,
        addr: ChunkAddr,
        modify_list: &[ModifyEntry],
        snapshot: Option<TypedBlocksSnapshot>,
    ) -> WorkerResult {
        let restored = snapshot.and_then(|s| match TypedBlocks::from_snapshot(s) {
            Ok(blocks) if blocks.size() == self.size => Some(blocks),
            Ok(_) => {
                warn!("Snapshot for chunk {addr} has a foreign chunk size, regenerating");
                None
            }
            Err(e) => {
                warn!("Failed to restore chunk {addr}: {e}, regenerating");
                None
            }
        });
        let (blocks, map) = match restored {
            Some(blocks) => (
                blocks,
                MapMetadata {
                    generator: "snapshot".into(),
                    max_height: None,
                },
            ),
            None => {
                let (mut blocks, map) = generate_chunk(self.generator.as_ref(), addr, self.size);
                apply_modify_list(&mut blocks, addr, modify_list, &self.registry);
                (blocks, map)
            }
        };
        self.chunks.insert(addr, blocks.clone());
        WorkerResult::BlocksGenerated { addr, blocks, map }
    }

    fn set_blocks(&mut self, list: Vec<SetBlockEntry>) -> Vec<WorkerResult> {
        let mut touched: Vec<ChunkAddr> = Vec::new();
        for entry in list {
            let addr = entry.addr(self.size);
            if let SetBlockEntry::Block { pos, block } = entry {
                let Some(blocks) = self.chunks.get_mut(&addr) else {
                    debug!("set block in unknown worker chunk {addr}");
                    continue;
                };
                let l = self.size.local(pos, self.size.origin(addr));
                if block.id == AIR_ID {
                    blocks.delete(l);
                } else {
                    blocks.set(l, block);
                }
            }
            if !touched.contains(&addr) {
                touched.push(addr);
            }
        }
        touched
            .into_iter()
            .filter_map(|addr| self.build(addr))
            .collect()
    }

    fn build(&self, addr: ChunkAddr) -> Option<WorkerResult> {
        let blocks = self.chunks.get(&addr)?;
        let size = self.size;
        let groups = build_vertices(addr, blocks, &self.registry, |pos| {
            let n = size.chunk_addr(pos);
            let other = self.chunks.get(&n)?;
            Some(other.id_at(size.local(pos, size.origin(n))))
        });
        Some(WorkerResult::VerticesGenerated { addr, groups })
    }
}

/// Channel to a worker.
pub trait WorkerLink: Send {
    fn post(&mut self, msg: WorkerMessage);
    /// Drain every result available right now. Never blocks.
    fn poll(&mut self) -> Vec<WorkerResult>;
}

/// Runs messages synchronously on the calling thread.
pub struct InlineWorker {
    world: WorkerWorld,
    results: VecDeque<WorkerResult>,
}

impl InlineWorker {
    pub fn new(world: WorkerWorld) -> Self {
        Self {
            world,
            results: VecDeque::new(),
        }
    }

    pub fn world(&self) -> &WorkerWorld {
        &self.world
    }
}

impl WorkerLink for InlineWorker {
    fn post(&mut self, msg: WorkerMessage) {
        let results = self.world.handle(msg);
        self.results.extend(results);
    }

    fn poll(&mut self) -> Vec<WorkerResult> {
        self.results.drain(..).collect()
    }
}

/// Worker on a dedicated OS thread.
pub struct ThreadWorker {
    tx: mpsc::UnboundedSender<WorkerMessage>,
    rx: mpsc::UnboundedReceiver<WorkerResult>,
}

impl ThreadWorker {
    pub fn spawn(mut world: WorkerWorld) -> std::io::Result<Self> {
        let (tx, mut msg_rx) = mpsc::unbounded_channel::<WorkerMessage>();
        let (result_tx, rx) = mpsc::unbounded_channel();
        thread::Builder::new()
            .name("chunk-worker".into())
            .spawn(move || {
                while let Some(msg) = msg_rx.blocking_recv() {
                    for result in world.handle(msg) {
                        if result_tx.send(result).is_err() {
                            return;
                        }
                    }
                }
                info!("Chunk worker stopped");
            })?;
        Ok(Self { tx, rx })
    }
}

impl WorkerLink for ThreadWorker {
    fn post(&mut self, msg: WorkerMessage) {
        if self.tx.send(msg).is_err() {
            warn!("Chunk worker is gone, message dropped");
        }
    }

    fn poll(&mut self) -> Vec<WorkerResult> {
        let mut out = Vec::new();
        while let Ok(result) = self.rx.try_recv() {
            out.push(result);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flat_generator::{FlatGenerator, FlatWorldBlocks};
    use crate::mesh::face_count;
    use serde_json::json;
    use std::time::{Duration, Instant};
    use webcraft_resource_pack::{BlockDefinition, PackConfig};

    fn registry() -> BlockRegistry {
        let mut reg = BlockRegistry::new();
        let def: BlockDefinition =
            serde_json::from_value(json!({"id": 1, "name": "BEDROCK", "material": "stone"}))
                .unwrap();
        reg.register(def, "base", &PackConfig::default()).unwrap();
        reg
    }

    fn world() -> WorkerWorld {
        let gen = FlatGenerator::with_blocks(FlatWorldBlocks {
            bedrock: Some(1),
            dirt: None,
            grass: None,
        });
        WorkerWorld::new(
            ChunkSize::new(4, 4, 4),
            Arc::new(registry()),
            Arc::new(gen),
        )
    }

    fn create(addr: ChunkAddr) -> WorkerMessage {
        WorkerMessage::CreateChunk {
            addr,
            modify_list: Vec::new(),
            snapshot: None,
        }
    }

    #[test]
    fn create_reports_blocks() {
        let mut w = world();
        let results = w.handle(create(ChunkAddr::new(0, 0, 0)));
        assert_eq!(results.len(), 1);
        match &results[0] {
            WorkerResult::BlocksGenerated { blocks, map, .. } => {
                assert_eq!(blocks.non_air_count(), 16);
                assert_eq!(map.generator, "flat");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(w.chunk_count(), 1);
    }

    #[test]
    fn snapshot_overrides_generation() {
        let mut w = world();
        let mut blocks = TypedBlocks::new(ChunkSize::new(4, 4, 4));
        blocks.set(crate::coords::LocalPos::new(1, 1, 1), BlockInstance::new(7));
        let results = w.handle(WorkerMessage::CreateChunk {
            addr: ChunkAddr::new(0, 0, 0),
            modify_list: Vec::new(),
            snapshot: Some(blocks.snapshot()),
        });
        match &results[0] {
            WorkerResult::BlocksGenerated { blocks, .. } => assert_eq!(blocks.non_air_count(), 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn set_block_remeshes_touched_chunks() {
        let mut w = world();
        w.handle(create(ChunkAddr::new(0, 0, 0)));
        w.handle(create(ChunkAddr::new(-1, 0, 0)));
        let results = w.handle(WorkerMessage::SetBlock {
            list: vec![
                SetBlockEntry::Block {
                    pos: BlockPos::new(0, 2, 0),
                    block: BlockInstance::new(1),
                },
                SetBlockEntry::Remesh {
                    addr: ChunkAddr::new(-1, 0, 0),
                },
                SetBlockEntry::Remesh {
                    addr: ChunkAddr::new(9, 9, 9),
                },
            ],
        });
        let addrs: Vec<_> = results
            .iter()
            .map(|r| match r {
                WorkerResult::VerticesGenerated { addr, .. } => *addr,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(addrs, vec![ChunkAddr::new(0, 0, 0), ChunkAddr::new(-1, 0, 0)]);
    }

    #[test]
    fn destruct_forgets_chunk() {
        let mut w = world();
        w.handle(create(ChunkAddr::new(0, 0, 0)));
        w.handle(WorkerMessage::DestructChunk {
            addrs: vec![ChunkAddr::new(0, 0, 0)],
        });
        assert_eq!(w.chunk_count(), 0);
        let results = w.handle(WorkerMessage::BuildVertices {
            addrs: vec![ChunkAddr::new(0, 0, 0)],
        });
        assert!(results.is_empty());
    }

    #[test]
    fn neighbor_storage_culls_boundary() {
        let mut w = world();
        w.handle(create(ChunkAddr::new(0, 0, 0)));
        let alone = match w.handle(WorkerMessage::BuildVertices {
            addrs: vec![ChunkAddr::new(0, 0, 0)],
        })
        .pop()
        {
            Some(WorkerResult::VerticesGenerated { groups, .. }) => face_count(&groups),
            other => panic!("unexpected {other:?}"),
        };
        w.handle(create(ChunkAddr::new(1, 0, 0)));
        let joined = match w.handle(WorkerMessage::BuildVertices {
            addrs: vec![ChunkAddr::new(0, 0, 0)],
        })
        .pop()
        {
            Some(WorkerResult::VerticesGenerated { groups, .. }) => face_count(&groups),
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(alone - joined, 4);
    }

    #[test]
    fn thread_worker_roundtrip() {
        let mut worker = ThreadWorker::spawn(world()).unwrap();
        worker.post(create(ChunkAddr::new(0, 0, 0)));
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut results = Vec::new();
        while results.is_empty() && Instant::now() < deadline {
            results = worker.poll();
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(matches!(
            results.first(),
            Some(WorkerResult::BlocksGenerated { .. })
        ));
    }
}
