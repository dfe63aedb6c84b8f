//! Client-side application of server batches, plus encoders for the chunk
//! payloads the server sends.

use std::collections::HashMap;

use tracing::{debug, trace, warn};

use webcraft_proto::batch::partition_block_sets;
use webcraft_proto::codec::Packet;
use webcraft_proto::error::ProtoError;
use webcraft_proto::packets::{
    id, BlockSet, ChunkLoaded, ChunkSnapshot, ErrorMessage, NearbyChunks, Pong,
};
use webcraft_proto::types::{BlockPos, ChunkAddr};

use crate::chunk_manager::ChunkManager;
use crate::coords::ChunkSize;
use crate::error::WorldError;
use crate::typed_blocks::{BlockInstance, TypedBlocks};

/// Group block-set packets by target chunk.
///
/// Groups appear in order of first occurrence and keep the original order
/// of their items, so the last write to a cell wins. Undecodable packets
/// are skipped.
pub fn group_block_sets(packets: &[Packet], size: ChunkSize) -> Vec<(ChunkAddr, Vec<BlockSet>)> {
    let mut groups: Vec<(ChunkAddr, Vec<BlockSet>)> = Vec::new();
    let mut index: HashMap<ChunkAddr, usize> = HashMap::new();
    for packet in packets {
        let set: BlockSet = match packet.decode() {
            Ok(set) => set,
            Err(e) => {
                warn!("Malformed block set skipped: {e}");
                continue;
            }
        };
        let addr = size.chunk_addr(set.pos);
        match index.get(&addr) {
            Some(&i) => groups[i].1.push(set),
            None => {
                index.insert(addr, groups.len());
                groups.push((addr, vec![set]));
            }
        }
    }
    groups
}

/// Apply one server batch. Block sets go first, grouped per chunk; the
/// remaining packets follow in arrival order. Returns packets to send back.
pub fn apply_packets(manager: &mut ChunkManager, packets: Vec<Packet>) -> Vec<Packet> {
    let (sets, rest) = partition_block_sets(packets);
    for (addr, items) in group_block_sets(&sets, manager.size()) {
        if !manager.contains(addr) {
            debug!("{} block sets for unloaded chunk {addr} dropped", items.len());
            continue;
        }
        manager.apply_block_set_group(addr, &items);
    }

    let mut out = Vec::new();
    for packet in rest {
        if let Err(e) = apply_packet(manager, &packet, &mut out) {
            warn!("Failed to apply packet {}: {e}", packet.name);
        }
    }
    out
}

fn apply_packet(
    manager: &mut ChunkManager,
    packet: &Packet,
    out: &mut Vec<Packet>,
) -> Result<(), WorldError> {
    match packet.name {
        id::NEARBY_CHUNKS => {
            let msg: NearbyChunks = packet.decode()?;
            out.extend(manager.apply_nearby(&msg));
        }
        id::CHUNK_LOADED => {
            let msg: ChunkLoaded = packet.decode()?;
            manager.on_modifiers_loaded(msg);
        }
        id::CHUNK_SNAPSHOT => {
            let msg: ChunkSnapshot = packet.decode()?;
            manager.on_snapshot(msg)?;
        }
        id::ERROR => {
            let msg: ErrorMessage = packet.decode()?;
            warn!("Server error: {}", msg.message);
        }
        id::PING => out.push(Packet::new(&Pong)?),
        other => trace!("packet {other} not handled by chunk sync"),
    }
    Ok(())
}

// ─── Encoders ───────────────────────────────────────────────────────────────

pub fn block_set_packet(
    pos: BlockPos,
    block: &BlockInstance,
    is_modify: bool,
) -> Result<Packet, ProtoError> {
    Packet::new(&BlockSet {
        pos,
        item: block.to_item(),
        is_modify,
    })
}

/// Full-chunk payload for initial load.
pub fn snapshot_packet(addr: ChunkAddr, blocks: &TypedBlocks) -> Result<Packet, WorldError> {
    let data = blocks.snapshot().pack()?;
    Ok(Packet::new(&ChunkSnapshot { addr, data })?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flat_generator::{FlatGenerator, FlatWorldBlocks};
    use crate::render::HeadlessBackend;
    use crate::worker::{InlineWorker, WorkerWorld};
    use crate::{block_registry::BlockRegistry, coords::LocalPos};
    use serde_json::json;
    use std::sync::Arc;
    use webcraft_proto::packets::{BlockItem, ChunkLoad, NearbyChunk, Ping};
    use webcraft_resource_pack::{BlockDefinition, PackConfig};

    fn manager() -> ChunkManager {
        let mut reg = BlockRegistry::new();
        for v in [
            json!({"id": 5, "name": "STONE", "material": "stone"}),
            json!({"id": 6, "name": "DIRT", "material": "dirt"}),
        ] {
            let def: BlockDefinition = serde_json::from_value(v).unwrap();
            reg.register(def, "base", &PackConfig::default()).unwrap();
        }
        let reg = Arc::new(reg);
        let size = ChunkSize::default();
        let gen = FlatGenerator::with_blocks(FlatWorldBlocks {
            bedrock: None,
            dirt: None,
            grass: None,
        });
        ChunkManager::new(
            size,
            reg.clone(),
            Box::new(InlineWorker::new(WorkerWorld::new(size, reg, Arc::new(gen)))),
            Box::new(HeadlessBackend::new()),
        )
    }

    fn set(x: i32, id: u32) -> Packet {
        block_set_packet(BlockPos::new(x, 10, 3), &BlockInstance::new(id), true).unwrap()
    }

    fn nearby(addrs: &[(i32, bool)]) -> Packet {
        Packet::new(&NearbyChunks {
            chunk_render_dist: 1,
            added: addrs
                .iter()
                .map(|&(x, has_modifiers)| NearbyChunk {
                    addr: ChunkAddr::new(x, 0, 0),
                    has_modifiers,
                })
                .collect(),
            deleted: Vec::new(),
        })
        .unwrap()
    }

    #[test]
    fn grouping_preserves_order() {
        let packets = vec![set(18, 5), set(2, 6), set(18, 6), set(19, 5)];
        let groups = group_block_sets(&packets, ChunkSize::default());
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, ChunkAddr::new(1, 0, 0));
        let ids: Vec<u32> = groups[0].1.iter().map(|s| s.item.id).collect();
        assert_eq!(ids, vec![5, 6, 5]);
        assert_eq!(groups[1].0, ChunkAddr::new(0, 0, 0));
    }

    #[test]
    fn last_write_wins_within_batch() {
        let mut m = manager();
        apply_packets(&mut m, vec![nearby(&[(1, false)])]);
        m.update();
        apply_packets(&mut m, vec![set(18, 5), set(18, 6)]);
        assert_eq!(m.get_block(BlockPos::new(18, 10, 3)).id, 6);
    }

    #[test]
    fn sets_for_unloaded_chunks_dropped() {
        let mut m = manager();
        let out = apply_packets(&mut m, vec![set(18, 5)]);
        assert!(out.is_empty());
        assert!(m.is_empty());
    }

    #[test]
    fn nearby_with_modifiers_requests_load_and_replays() {
        let mut m = manager();
        let out = apply_packets(&mut m, vec![nearby(&[(1, true)])]);
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].decode::<ChunkLoad>().unwrap().pos,
            ChunkAddr::new(1, 0, 0)
        );
        let loaded = Packet::new(&ChunkLoaded {
            addr: ChunkAddr::new(1, 0, 0),
            modify_list: vec![webcraft_proto::packets::ModifyEntry {
                pos: BlockPos::new(18, 10, 3),
                item: BlockItem::new(5),
            }],
        })
        .unwrap();
        apply_packets(&mut m, vec![loaded]);
        m.update();
        assert_eq!(m.get_block(BlockPos::new(18, 10, 3)).id, 5);
    }

    #[test]
    fn snapshot_packet_applies() {
        let mut blocks = TypedBlocks::new(ChunkSize::default());
        blocks.set(LocalPos::new(1, 1, 1), BlockInstance::new(6));
        let snap = snapshot_packet(ChunkAddr::new(0, 0, 0), &blocks).unwrap();

        let mut m = manager();
        apply_packets(&mut m, vec![nearby(&[(0, true)]), snap]);
        m.update();
        assert_eq!(m.get_block(BlockPos::new(1, 1, 1)).id, 6);
    }

    #[test]
    fn ping_answered_and_garbage_tolerated() {
        let mut m = manager();
        let out = apply_packets(
            &mut m,
            vec![
                Packet::new(&Ping).unwrap(),
                Packet::raw(id::NEARBY_CHUNKS, json!("nope")),
            ],
        );
        assert_eq!(out.len(), 1);
        assert!(out[0].is::<Pong>());
    }

    #[test]
    fn block_set_encodes_defaults_compactly() {
        let p = set(18, 5);
        assert_eq!(p.data["item"], json!({"id": 5}));
        assert_eq!(p.data["is_modify"], json!(true));
    }
}
