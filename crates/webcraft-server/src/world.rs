//! Server world: connected players, chunk visibility, authoritative block
//! edits and their persistence.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use webcraft_proto::batch::partition_block_sets;
use webcraft_proto::codec::Packet;
use webcraft_proto::packets::{
    id, BlockDestroy, BlockItem, BlockSet, ChangeRenderDist, ChunkLoad, ChunkLoaded, Connected,
    ErrorMessage, InventoryNewState, InventoryState, ModifyEntry, NearbyChunk, NearbyChunks,
    PlayerJoin, PlayerLeave, PlayerState, Pong,
};
use webcraft_proto::types::{BlockPos, ChunkAddr, Vec3};
use webcraft_world::block_registry::BlockRegistry;
use webcraft_world::chunk::SetBlockRequest;
use webcraft_world::coords::{in_world, ChunkSize};
use webcraft_world::error::WorldError;
use webcraft_world::extra_data::make_extra_data;
use webcraft_world::generator::TerrainGenerator;
use webcraft_world::modified::ModifiedChunkSet;
use webcraft_world::storage::{WorldInfo, WorldStore};
use webcraft_world::sync::{block_set_packet, snapshot_packet};

use crate::config::ChunkTransfer;
use crate::permissions::AdminList;
use crate::player::{PacketSender, ServerPlayer};
use crate::server_chunk_manager::{diff_nearby, spiral_addrs, ServerChunkManager};

/// Only admins may place this block.
pub const BEDROCK_ID: u32 = 1;

#[derive(Debug, Error)]
pub enum ServerWorldError {
    #[error("not permitted: {0}")]
    NotPermitted(String),

    #[error("player {0} is not connected")]
    UnknownPlayer(u64),

    #[error(transparent)]
    World(#[from] WorldError),
}

#[derive(Debug, Clone, Copy)]
pub struct WorldOptions {
    pub chunk_size: ChunkSize,
    pub chunk_transfer: ChunkTransfer,
    pub min_chunk_y: i32,
}

pub struct ServerWorld {
    pub info: WorldInfo,
    registry: Arc<BlockRegistry>,
    chunks: ServerChunkManager,
    modified: ModifiedChunkSet,
    store: Box<dyn WorldStore>,
    admins: AdminList,
    players: HashMap<u64, ServerPlayer>,
    options: WorldOptions,
}

impl ServerWorld {
    /// Build the world and restore the modified chunk index from the store.
    pub fn init(
        info: WorldInfo,
        registry: Arc<BlockRegistry>,
        generator: Arc<dyn TerrainGenerator>,
        mut store: Box<dyn WorldStore>,
        admins: AdminList,
        options: WorldOptions,
    ) -> Result<Self, WorldError> {
        let mut modified = ModifiedChunkSet::new();
        modified.load(store.chunk_became_modified()?);
        info!(
            "World {} ({}) ready, {} modified chunks",
            info.name,
            info.guid,
            modified.len()
        );
        Ok(Self {
            info,
            chunks: ServerChunkManager::new(options.chunk_size, generator, registry.clone()),
            registry,
            modified,
            store,
            admins,
            players: HashMap::new(),
            options,
        })
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn player(&self, id: u64) -> Option<&ServerPlayer> {
        self.players.get(&id)
    }

    pub fn loaded_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn player_names(&self) -> Vec<String> {
        self.players.values().map(|p| p.username.clone()).collect()
    }

    pub fn admins_mut(&mut self) -> &mut AdminList {
        &mut self.admins
    }

    // ─── Sessions ───────────────────────────────────────────────────────────

    pub fn on_player(&mut self, id: u64, username: String, tx: PacketSender) {
        let duplicate = self
            .players
            .values()
            .find(|p| p.username == username)
            .map(|p| p.id);
        if let Some(old) = duplicate {
            info!("{username} connected again, dropping session {old}");
            self.on_leave(old);
        }

        let mut player = ServerPlayer::new(id, username, tx);
        match self.store.load_player_state(&player.username) {
            Ok(Some(record)) if in_world(&record.pos) => player.apply_record(&record),
            Ok(Some(record)) => {
                warn!("Stored position of {} is outside the world", player.username);
                player.apply_record(&record);
                player.pos = self.info.spawn;
            }
            Ok(None) => player.pos = self.info.spawn,
            Err(e) => {
                warn!("Failed to load state of {}: {e}", player.username);
                player.pos = self.info.spawn;
            }
        }

        player.send_packet(&Connected {
            player_id: id,
            world_guid: self.info.guid.clone(),
            chunk_render_dist: player.render_dist,
        });
        match self.store.load_player_inventory(&player.username) {
            Ok(Some(inventory)) => player.send_packet(&InventoryState(inventory)),
            Ok(None) => {}
            Err(e) => warn!("Failed to load inventory of {}: {e}", player.username),
        }
        let join = PlayerJoin {
            id,
            username: player.username.clone(),
            pos: player.pos,
        };
        for other in self.players.values() {
            other.send_packet(&join);
            player.send_packet(&PlayerJoin {
                id: other.id,
                username: other.username.clone(),
                pos: other.pos,
            });
        }
        player.force_visibility = true;
        info!("{} joined as player {id}", player.username);
        self.players.insert(id, player);
    }

    pub fn on_leave(&mut self, id: u64) {
        let Some(player) = self.players.remove(&id) else {
            return;
        };
        if let Err(e) = self
            .store
            .save_player_state(&player.username, &player.record())
        {
            warn!("Failed to save state of {}: {e}", player.username);
        }
        self.chunks.forget_player(id);
        for other in self.players.values() {
            other.send_packet(&PlayerLeave { id });
        }
        info!("{} left", player.username);
    }

    // ─── Tick ───────────────────────────────────────────────────────────────

    pub fn tick(&mut self) {
        let ids: Vec<u64> = self.players.keys().copied().collect();
        for id in ids {
            self.check_player_visible_chunks(id);
        }
        self.chunks.unload_unused();
    }

    /// Recompute the chunks a player should see and send the difference as
    /// one batch. Runs only after the player moved or their render distance
    /// changed; nothing is sent while they stay in the same chunk.
    pub fn check_player_visible_chunks(&mut self, id: u64) {
        let size = self.options.chunk_size;
        let min_chunk_y = self.options.min_chunk_y;
        let Some(player) = self.players.get_mut(&id) else {
            return;
        };
        if !player.position_changed && !player.force_visibility {
            return;
        }
        player.position_changed = false;
        let Some(addr) = size.chunk_addr_of(player.pos) else {
            return;
        };
        if player.chunk_addr == Some(addr) && !player.force_visibility {
            return;
        }
        player.chunk_addr = Some(addr);
        player.force_visibility = false;

        let next = spiral_addrs(size, addr, player.render_dist, min_chunk_y);
        let (added, deleted) = diff_nearby(&player.nearby, &next);
        if added.is_empty() && deleted.is_empty() {
            return;
        }
        for a in &deleted {
            player.nearby.remove(a);
            if let Some(chunk) = self.chunks.get_loaded_mut(*a) {
                chunk.players.remove(&id);
            }
        }
        player.nearby.extend(added.iter().copied());

        let msg = NearbyChunks {
            chunk_render_dist: player.render_dist,
            added: added
                .into_iter()
                .map(|a| NearbyChunk {
                    addr: a,
                    has_modifiers: self.modified.has_modifications(a),
                })
                .collect(),
            deleted,
        };
        debug!(
            "Player {id} at {addr}: +{} -{} chunks",
            msg.added.len(),
            msg.deleted.len()
        );
        player.send_packet(&msg);
    }

    /// Persist every player's state and flush the store.
    pub fn save(&mut self) -> Result<(), WorldError> {
        for player in self.players.values() {
            self.store
                .save_player_state(&player.username, &player.record())?;
        }
        self.store.flush()?;
        debug!("World saved, {} players", self.players.len());
        Ok(())
    }

    // ─── Player commands ────────────────────────────────────────────────────

    /// Handle one inbound batch. Block sets go first, in order, then the rest.
    /// Policy errors are reported back to the sender.
    pub async fn handle_packets(&mut self, player_id: u64, packets: Vec<Packet>) {
        let (sets, rest) = partition_block_sets(packets);
        for packet in sets.iter().chain(rest.iter()) {
            if let Err(e) = self.handle_packet(player_id, packet).await {
                match &e {
                    ServerWorldError::World(WorldError::Proto(_)) => {
                        debug!("Malformed packet {} from {player_id}: {e}", packet.name)
                    }
                    _ => warn!("Packet {} from {player_id} failed: {e}", packet.name),
                }
                if let Some(player) = self.players.get(&player_id) {
                    player.send_packet(&ErrorMessage {
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    async fn handle_packet(
        &mut self,
        player_id: u64,
        packet: &Packet,
    ) -> Result<(), ServerWorldError> {
        match packet.name {
            id::BLOCK_SET => self.set_block(player_id, packet.decode().map_err(WorldError::from)?),
            id::BLOCK_DESTROY => {
                let msg: BlockDestroy = packet.decode().map_err(WorldError::from)?;
                self.destroy_block(player_id, msg.pos)
            }
            id::CHUNK_LOAD => {
                let msg: ChunkLoad = packet.decode().map_err(WorldError::from)?;
                self.load_chunk_for_player(player_id, msg.pos).await
            }
            id::PLAYER_STATE => {
                let msg: PlayerState = packet.decode().map_err(WorldError::from)?;
                self.change_player_position(player_id, msg);
                Ok(())
            }
            id::CHANGE_RENDER_DIST => {
                let msg: ChangeRenderDist = packet.decode().map_err(WorldError::from)?;
                self.change_render_dist(player_id, msg.0);
                Ok(())
            }
            id::INVENTORY_NEW_STATE => {
                let msg: InventoryNewState = packet.decode().map_err(WorldError::from)?;
                self.save_inventory(player_id, &msg.0)
            }
            id::PING => {
                if let Some(player) = self.players.get(&player_id) {
                    player.send_packet(&Pong);
                }
                Ok(())
            }
            id::PONG => Ok(()),
            other => {
                debug!("Unhandled packet {other} from player {player_id}");
                Ok(())
            }
        }
    }

    /// Non-finite positions and positions outside the world are ignored.
    pub fn change_player_position(&mut self, id: u64, state: PlayerState) {
        let Some(player) = self.players.get_mut(&id) else {
            return;
        };
        if !in_world(&state.pos) || !state.rotate.is_finite() {
            debug!("Player {id} sent out-of-world position {:?}", state.pos);
            return;
        }
        player.pos = state.pos;
        player.rotate = state.rotate;
        player.position_changed = true;
    }

    pub fn save_inventory(
        &mut self,
        id: u64,
        inventory: &serde_json::Value,
    ) -> Result<(), ServerWorldError> {
        let Some(player) = self.players.get(&id) else {
            return Err(ServerWorldError::UnknownPlayer(id));
        };
        self.store.save_player_inventory(&player.username, inventory)?;
        Ok(())
    }

    pub fn change_render_dist(&mut self, id: u64, dist: i32) {
        if let Some(player) = self.players.get_mut(&id) {
            if player.set_render_dist(dist) {
                debug!("Player {id} render distance {}", player.render_dist);
            }
        }
    }

    /// Send a visible chunk's persisted state. Requests for chunks the
    /// player was never told about are ignored.
    pub async fn load_chunk_for_player(
        &mut self,
        id: u64,
        addr: ChunkAddr,
    ) -> Result<(), ServerWorldError> {
        let Some(player) = self.players.get(&id) else {
            return Err(ServerWorldError::UnknownPlayer(id));
        };
        if !player.nearby.contains(&addr) {
            debug!("Player {id} requested invisible chunk {addr}");
            return Ok(());
        }
        let chunk = self
            .chunks
            .get(addr, self.store.as_mut(), &self.modified)
            .await?;
        chunk.players.insert(id);
        let packet = match self.options.chunk_transfer {
            ChunkTransfer::ModifyList => Packet::new(&ChunkLoaded {
                addr,
                modify_list: chunk.modify_list.clone(),
            })
            .map_err(WorldError::from)?,
            ChunkTransfer::Snapshot => snapshot_packet(addr, &chunk.blocks)?,
        };
        if let Some(player) = self.players.get(&id) {
            player.send(vec![packet]);
        }
        Ok(())
    }

    /// Apply a player edit to a loaded chunk, persist it and broadcast it to
    /// every player that has the chunk. Invalid edits and edits to chunks
    /// that are not loaded change nothing.
    pub fn set_block(&mut self, id: u64, mut set: BlockSet) -> Result<(), ServerWorldError> {
        let Some(player) = self.players.get(&id) else {
            return Err(ServerWorldError::UnknownPlayer(id));
        };
        if set.item.id == BEDROCK_ID && !self.admins.is_admin(&player.username) {
            return Err(ServerWorldError::NotPermitted(format!(
                "{} may not place bedrock",
                player.username
            )));
        }
        let Some(block) = self.registry.get(set.item.id) else {
            debug!("Player {id} placed unknown block {}", set.item.id);
            return Ok(());
        };
        if set.item.extra_data.is_none() {
            set.item.extra_data =
                make_extra_data(block.extra_data_schema, &block.definition, set.pos, Vec3::ZERO)
                    .map(|e| e.to_value());
        }
        if block.is_entity {
            return self.create_entity(id, set);
        }
        set.item.entity_id = None;
        self.apply_block_set(id, &set);
        Ok(())
    }

    /// Place a block that carries an entity, assigning it a fresh id.
    pub fn create_entity(&mut self, id: u64, mut set: BlockSet) -> Result<(), ServerWorldError> {
        if !self.players.contains_key(&id) {
            return Err(ServerWorldError::UnknownPlayer(id));
        }
        let entity_id = format!("{:016x}", rand::random::<u64>());
        set.item.entity_id = Some(entity_id.clone());
        if self.apply_block_set(id, &set) {
            debug!("Entity {entity_id} created at {}", set.pos);
        }
        Ok(())
    }

    pub fn destroy_block(&mut self, id: u64, pos: BlockPos) -> Result<(), ServerWorldError> {
        self.set_block(
            id,
            BlockSet {
                pos,
                item: BlockItem::air(),
                is_modify: true,
            },
        )
    }

    fn apply_block_set(&mut self, id: u64, set: &BlockSet) -> bool {
        let addr = self.options.chunk_size.chunk_addr(set.pos);
        let Some(chunk) = self.chunks.get_loaded_mut(addr) else {
            debug!("Edit at {} dropped, chunk {addr} not loaded", set.pos);
            return false;
        };
        let req = SetBlockRequest::from_block_set(set, &self.registry);
        let Some(block) = chunk.set_block(&req, &self.registry) else {
            debug!("Edit at {} by player {id} rejected", set.pos);
            return false;
        };
        let audience: Vec<u64> = chunk.players.iter().copied().collect();

        let entry = ModifyEntry {
            pos: set.pos,
            item: block.to_item(),
        };
        if let Err(e) = self.store.block_set(id, addr, &entry) {
            warn!("Failed to persist edit at {}: {e}", set.pos);
        }
        if self.modified.mark_modified(addr) {
            debug!("Chunk {addr} is now modified");
        }

        match block_set_packet(set.pos, &block, true) {
            Ok(packet) => {
                for pid in audience {
                    if let Some(p) = self.players.get(&pid) {
                        p.send(vec![packet.clone()]);
                    }
                }
            }
            Err(e) => warn!("Failed to encode edit at {}: {e}", set.pos),
        }
        true
    }
}
